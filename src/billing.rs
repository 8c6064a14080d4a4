use crate::columns::LedgerColumns;
use crate::value::Record;
use serde::Serialize;
use thiserror::Error;

/// One meter channel reading pair
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct MeterPair {
    pub current: f64,
    pub previous: f64,
}

/// Inputs of the billing formula
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct BillInputs {
    pub meter_factor: f64,
    pub rate: f64,
    pub export: MeterPair,
    pub import: MeterPair,
}

/// Every value derived from one set of readings
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct BillBreakdown {
    pub diff_export: f64,
    pub kwh_export: f64,
    pub diff_import: f64,
    pub kwh_import: f64,
    pub net_units: f64,
    pub bill: f64,
}

impl BillInputs {
    /// Apply the billing formula
    ///
    /// Meter differences are scaled by the meter factor into energy units;
    /// the bill is net units times the rate, rounded to a whole amount.
    pub fn compute(&self) -> BillBreakdown {
        let diff_export = self.export.current - self.export.previous;
        let kwh_export = diff_export * self.meter_factor;
        let diff_import = self.import.current - self.import.previous;
        let kwh_import = diff_import * self.meter_factor;
        let net_units = kwh_export - kwh_import;
        BillBreakdown {
            diff_export,
            kwh_export,
            diff_import,
            kwh_import,
            net_units,
            bill: (net_units * self.rate).round(),
        }
    }
}

/// Starting point for the next ledger entry
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Baseline {
    /// Index of the ledger row the baseline was read from
    pub row: usize,
    pub meter_factor: f64,
    pub rate: f64,
    /// That row's current export, the next entry's previous export
    pub previous_export: f64,
    /// That row's current import, the next entry's previous import
    pub previous_import: f64,
}

impl Baseline {
    pub fn inputs(&self, current_export: f64, current_import: f64) -> BillInputs {
        BillInputs {
            meter_factor: self.meter_factor,
            rate: self.rate,
            export: MeterPair {
                current: current_export,
                previous: self.previous_export,
            },
            import: MeterPair {
                current: current_import,
                previous: self.previous_import,
            },
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum PreviewError {
    #[error("no earlier reading has a valid meter factor")]
    NoBaseline,
}

/// Most recent ledger row with a usable meter factor
///
/// Scans from the end backward. Rows whose meter factor is missing, not a
/// number, or not strictly positive are skipped entirely; this is not the
/// same as "the last row".
pub fn latest_baseline(rows: &[Record], columns: &LedgerColumns) -> Option<Baseline> {
    let mf_column = columns.meter_factor.as_deref()?;
    rows.iter().enumerate().rev().find_map(|(idx, row)| {
        let mf = row.try_number(mf_column).filter(|mf| *mf > 0.0)?;
        Some(Baseline {
            row: idx,
            meter_factor: mf,
            rate: row.number_in(columns.rate.as_deref()),
            previous_export: row.number_in(columns.export_current.as_deref()),
            previous_import: row.number_in(columns.import_current.as_deref()),
        })
    })
}

/// Preview the bill for a proposed reading against the ledger history
pub fn preview<S: AsRef<str>>(
    rows: &[Record],
    headers: &[S],
    current_export: f64,
    current_import: f64,
) -> Result<BillBreakdown, PreviewError> {
    let columns = LedgerColumns::resolve(headers);
    let baseline = latest_baseline(rows, &columns).ok_or(PreviewError::NoBaseline)?;
    Ok(baseline.inputs(current_export, current_import).compute())
}
