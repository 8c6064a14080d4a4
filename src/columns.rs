//! Column role resolution
//!
//! Uploaded sheets do not share a fixed schema, so every consumer finds its
//! columns by role. Each role maps to an ordered list of predicates; a
//! predicate matches a column whose lowercase name contains all of its
//! fragments and none of its exclusions. Predicates are tried in priority
//! order and, within one predicate, the first column in source order wins.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    static ref MONTH_LABEL_REGEX: Regex = Regex::new(r"^([A-Za-z]+-\d{2})").unwrap();
    static ref BARE_MONTH_REGEX: Regex = Regex::new(r"^[A-Za-z]+-\d{2}$").unwrap();
}

/// Semantic role a column can play
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Role {
    PlantType,
    State,
    InstalledCapacity,
    ContractedCapacity,
    MeterFactor,
    Rate,
    ExportCurrent,
    ExportPrevious,
    ExportDifference,
    ExportKwh,
    ImportCurrent,
    ImportPrevious,
    ImportDifference,
    ImportKwh,
    NetUnits,
    BillAmount,
    ReadingDate,
    InvoiceDate,
    ProcessDate,
}

/// One match rule: all fragments present, no exclusion present
#[derive(Clone, Copy, Debug)]
pub struct Predicate {
    pub all: &'static [&'static str],
    pub none: &'static [&'static str],
}

const fn all(fragments: &'static [&'static str]) -> Predicate {
    Predicate {
        all: fragments,
        none: &[],
    }
}

const fn all_except(
    fragments: &'static [&'static str],
    exclusions: &'static [&'static str],
) -> Predicate {
    Predicate {
        all: fragments,
        none: exclusions,
    }
}

impl Predicate {
    pub fn matches(&self, column: &str) -> bool {
        let lower = column.to_lowercase();
        self.all.iter().all(|f| lower.contains(f)) && !self.none.iter().any(|f| lower.contains(f))
    }
}

const PLANT_TYPE: &[Predicate] = &[all(&["plant", "type"]), all(&["type"]), all(&["source"])];
const STATE: &[Predicate] = &[all(&["state"]), all(&["location"]), all(&["within"])];
const INSTALLED_CAPACITY: &[Predicate] = &[
    all(&["installed", "capacity"]),
    all(&["capacity"]),
    all(&["mw"]),
];
const CONTRACTED_CAPACITY: &[Predicate] = &[all(&["contract", "capacity"]), all(&["contracted"])];
const METER_FACTOR: &[Predicate] = &[all(&["meter", "factor"]), all(&["mf"])];
const RATE: &[Predicate] = &[all(&["rate"]), all(&["tariff"])];
const EXPORT_CURRENT: &[Predicate] = &[all(&["export - current"]), all(&["export", "current"])];
const EXPORT_PREVIOUS: &[Predicate] = &[all(&["export - previous"]), all(&["export", "previous"])];
const EXPORT_DIFFERENCE: &[Predicate] =
    &[all(&["export - difference"]), all(&["export", "diff"])];
const EXPORT_KWH: &[Predicate] = &[all(&["export - kwh"]), all(&["export", "kwh"])];
const IMPORT_CURRENT: &[Predicate] = &[all(&["import - current"]), all(&["import", "current"])];
const IMPORT_PREVIOUS: &[Predicate] = &[all(&["import - previous"]), all(&["import", "previous"])];
const IMPORT_DIFFERENCE: &[Predicate] =
    &[all(&["import - difference"]), all(&["import", "diff"])];
const IMPORT_KWH: &[Predicate] = &[all(&["import - kwh"]), all(&["import", "kwh"])];
const NET_UNITS: &[Predicate] = &[all(&["net", "unit"]), all(&["net"])];
const BILL_AMOUNT: &[Predicate] = &[
    all(&["bill", "amount"]),
    all_except(&["bill"], &["date", "month", "no"]),
];
const READING_DATE: &[Predicate] = &[
    all_except(&["month"], &["invoice", "process"]),
    all_except(&["date"], &["invoice", "process"]),
];
const INVOICE_DATE: &[Predicate] = &[all(&["invoice", "date"])];
const PROCESS_DATE: &[Predicate] = &[all(&["process", "date"])];

impl Role {
    /// Match predicates for this role, highest priority first
    pub fn predicates(self) -> &'static [Predicate] {
        match self {
            Role::PlantType => PLANT_TYPE,
            Role::State => STATE,
            Role::InstalledCapacity => INSTALLED_CAPACITY,
            Role::ContractedCapacity => CONTRACTED_CAPACITY,
            Role::MeterFactor => METER_FACTOR,
            Role::Rate => RATE,
            Role::ExportCurrent => EXPORT_CURRENT,
            Role::ExportPrevious => EXPORT_PREVIOUS,
            Role::ExportDifference => EXPORT_DIFFERENCE,
            Role::ExportKwh => EXPORT_KWH,
            Role::ImportCurrent => IMPORT_CURRENT,
            Role::ImportPrevious => IMPORT_PREVIOUS,
            Role::ImportDifference => IMPORT_DIFFERENCE,
            Role::ImportKwh => IMPORT_KWH,
            Role::NetUnits => NET_UNITS,
            Role::BillAmount => BILL_AMOUNT,
            Role::ReadingDate => READING_DATE,
            Role::InvoiceDate => INVOICE_DATE,
            Role::ProcessDate => PROCESS_DATE,
        }
    }
}

/// Find the column playing `role`, if any
pub fn resolve<'a, S: AsRef<str>>(role: Role, columns: &'a [S]) -> Option<&'a str> {
    role.predicates().iter().find_map(|predicate| {
        columns
            .iter()
            .map(|c| c.as_ref())
            .find(|column| predicate.matches(column))
    })
}

/// Identity column of a project row
///
/// The first column naming both "name" and "project", else the first column.
pub fn name_column<S: AsRef<str>>(columns: &[S]) -> Option<&str> {
    columns
        .iter()
        .map(|c| c.as_ref())
        .find(|c| {
            let lower = c.to_lowercase();
            lower.contains("name") && lower.contains("project")
        })
        .or_else(|| columns.first().map(|c| c.as_ref()))
}

/// Month label at the start of a column name (`"Jan-25 - Generation"` → `"Jan-25"`)
pub fn month_label(column: &str) -> Option<&str> {
    MONTH_LABEL_REGEX
        .captures(column)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Every column that carries monthly generation figures
///
/// A column qualifies when its name mentions "generation" or is itself a
/// bare month label such as `Jan-25`.
pub fn resolve_generation<S: AsRef<str>>(columns: &[S]) -> Vec<&str> {
    columns
        .iter()
        .map(|c| c.as_ref())
        .filter(|c| c.to_lowercase().contains("generation") || BARE_MONTH_REGEX.is_match(c))
        .collect()
}

fn owned(role: Role, columns: &[impl AsRef<str>]) -> Option<String> {
    resolve(role, columns).map(str::to_string)
}

/// Columns the aggregator reads from a project row
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProjectColumns {
    pub plant_type: Option<String>,
    pub state: Option<String>,
    pub installed_capacity: Option<String>,
    pub contracted_capacity: Option<String>,
    pub generation: Vec<String>,
}

impl ProjectColumns {
    pub fn resolve<S: AsRef<str>>(columns: &[S]) -> Self {
        ProjectColumns {
            plant_type: owned(Role::PlantType, columns),
            state: owned(Role::State, columns),
            installed_capacity: owned(Role::InstalledCapacity, columns),
            contracted_capacity: owned(Role::ContractedCapacity, columns),
            generation: resolve_generation(columns)
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Columns of a billing ledger, resolved once per header set
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LedgerColumns {
    pub meter_factor: Option<String>,
    pub rate: Option<String>,
    pub export_current: Option<String>,
    pub export_previous: Option<String>,
    pub export_difference: Option<String>,
    pub export_kwh: Option<String>,
    pub import_current: Option<String>,
    pub import_previous: Option<String>,
    pub import_difference: Option<String>,
    pub import_kwh: Option<String>,
    pub net_units: Option<String>,
    pub bill_amount: Option<String>,
    pub reading_date: Option<String>,
    pub invoice_date: Option<String>,
    pub process_date: Option<String>,
}

impl LedgerColumns {
    pub fn resolve<S: AsRef<str>>(columns: &[S]) -> Self {
        LedgerColumns {
            meter_factor: owned(Role::MeterFactor, columns),
            rate: owned(Role::Rate, columns),
            export_current: owned(Role::ExportCurrent, columns),
            export_previous: owned(Role::ExportPrevious, columns),
            export_difference: owned(Role::ExportDifference, columns),
            export_kwh: owned(Role::ExportKwh, columns),
            import_current: owned(Role::ImportCurrent, columns),
            import_previous: owned(Role::ImportPrevious, columns),
            import_difference: owned(Role::ImportDifference, columns),
            import_kwh: owned(Role::ImportKwh, columns),
            net_units: owned(Role::NetUnits, columns),
            bill_amount: owned(Role::BillAmount, columns),
            reading_date: owned(Role::ReadingDate, columns),
            invoice_date: owned(Role::InvoiceDate, columns),
            process_date: owned(Role::ProcessDate, columns),
        }
    }

    /// Whether a row with these columns can be recomputed in place
    ///
    /// Import difference is optional; everything else must be present.
    pub fn supports_recompute(&self) -> bool {
        [
            &self.export_current,
            &self.export_previous,
            &self.export_difference,
            &self.export_kwh,
            &self.import_current,
            &self.import_previous,
            &self.import_kwh,
            &self.net_units,
            &self.bill_amount,
        ]
        .iter()
        .all(|c| c.is_some())
    }

    /// Whether editing `column` must trigger a recompute
    pub fn is_input(&self, column: &str) -> bool {
        [
            &self.export_current,
            &self.import_current,
            &self.meter_factor,
            &self.rate,
        ]
        .iter()
        .any(|c| c.as_deref() == Some(column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installed_capacity_prefers_the_specific_phrase() {
        let cols = ["Capacity (MW)", "Installed Project Capacity (MW)"];
        assert_eq!(
            resolve(Role::InstalledCapacity, &cols),
            Some("Installed Project Capacity (MW)")
        );
    }

    #[test]
    fn ties_break_by_column_order() {
        let cols = ["Capacity A", "Capacity B"];
        assert_eq!(resolve(Role::InstalledCapacity, &cols), Some("Capacity A"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let cols = ["PLANT TYPE", "STATE"];
        assert_eq!(resolve(Role::PlantType, &cols), Some("PLANT TYPE"));
        assert_eq!(resolve(Role::State, &cols), Some("STATE"));
    }

    #[test]
    fn missing_role_resolves_to_none() {
        let cols = ["Name of Project", "District"];
        assert_eq!(resolve(Role::MeterFactor, &cols), None);
    }

    #[test]
    fn bill_fallback_skips_bill_dates() {
        let cols = ["Bill Month", "BILL"];
        assert_eq!(resolve(Role::BillAmount, &cols), Some("BILL"));
        assert_eq!(resolve(Role::ReadingDate, &cols), Some("Bill Month"));
    }

    #[test]
    fn name_column_falls_back_to_first() {
        assert_eq!(
            name_column(&["Sr", "Name of Project"]),
            Some("Name of Project")
        );
        assert_eq!(name_column(&["Company", "State"]), Some("Company"));
        assert_eq!(name_column::<&str>(&[]), None);
    }

    #[test]
    fn month_labels_need_the_prefix_pattern() {
        assert_eq!(month_label("Jan-25 - Generation"), Some("Jan-25"));
        assert_eq!(month_label("April-25"), Some("April-25"));
        assert_eq!(month_label("Total Generation"), None);
        assert_eq!(month_label("2025-04 Generation"), None);
    }

    #[test]
    fn ledger_columns_resolve_dash_phrases() {
        let headers = [
            "MONTH",
            "MF",
            "RATE",
            "EXPORT - CURRENT",
            "EXPORT - PREVIOUS",
            "EXPORT - DIFFERENCE",
            "EXPORT - KWH",
            "IMPORT - CURRENT",
            "IMPORT - PREVIOUS",
            "IMPORT - KWH",
            "NET UNITS",
            "BILL AMOUNT",
        ];
        let cols = LedgerColumns::resolve(&headers);
        assert_eq!(cols.export_previous.as_deref(), Some("EXPORT - PREVIOUS"));
        assert_eq!(cols.import_difference, None);
        assert!(cols.supports_recompute());
        assert!(cols.is_input("MF"));
        assert!(!cols.is_input("NET UNITS"));
    }
}
