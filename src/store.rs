use crate::billing::{self, BillBreakdown};
use crate::columns::LedgerColumns;
use crate::ledger::RowSink;
use crate::stats::{self, DashboardStats};
use crate::value::Record;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Monthly sheet column that names the project
pub const NAME_OF_PROJECT: &str = "Name of Project";
/// Master sheet column the monthly sheet joins against
pub const MASTER_JOIN_COLUMN: &str = "NAME OF GENERATING COMPANY";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store file is corrupt: {0}")]
    Format(#[from] serde_json::Error),
    #[error("no ledger found for project '{0}'")]
    UnknownProject(String),
    #[error("no ledger row for month '{month}' in project '{project}'")]
    UnknownRow { project: String, month: String },
    #[error("sheet has no '{0}' column")]
    MissingColumn(String),
    #[error("cannot add a reading: {0}")]
    Preview(#[from] billing::PreviewError),
}

/// A table: ordered headers plus rows keyed by those headers
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<Record>,
}

impl Sheet {
    pub fn new(headers: Vec<String>, rows: Vec<Record>) -> Self {
        Sheet { headers, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|h| h == column)
    }

    fn add_header(&mut self, column: &str) {
        if !self.has_column(column) {
            self.headers.push(column.to_string());
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Book {
    master: Sheet,
    monthly: Sheet,
    ledgers: BTreeMap<String, Sheet>,
}

impl Book {
    fn ledger_key(&self, project: &str) -> Option<String> {
        let wanted = project.trim().to_lowercase();
        self.ledgers
            .keys()
            .find(|k| k.trim().to_lowercase() == wanted)
            .cloned()
    }

    fn ledger_mut(&mut self, project: &str) -> Result<(String, &mut Sheet), StoreError> {
        let key = self
            .ledger_key(project)
            .ok_or_else(|| StoreError::UnknownProject(project.to_string()))?;
        let ledger = self
            .ledgers
            .get_mut(&key)
            .ok_or_else(|| StoreError::UnknownProject(key.clone()))?;
        Ok((key, ledger))
    }
}

/// A new monthly reading submitted for server-side billing
#[derive(Clone, Debug, Deserialize)]
pub struct NewReading {
    pub project_name: String,
    pub date: String,
    pub current_export: f64,
    pub current_import: f64,
    /// Any further fields, written to ledger columns of the same name
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The office's project data, persisted as gzip-compressed JSON
///
/// Every mutation rewrites the whole file through a temporary file in the
/// same directory. Callers serialize access; the last write wins.
#[derive(Debug)]
pub struct DataStore {
    path: Option<PathBuf>,
    book: Book,
}

impl DataStore {
    /// Open the store at `path`, starting empty if the file does not exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let book = if path.exists() {
            let decoder = GzDecoder::new(File::open(&path)?);
            serde_json::from_reader(BufReader::new(decoder))?
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            info!("creating new store at {}", path.display());
            Book::default()
        };
        Ok(DataStore {
            path: Some(path),
            book,
        })
    }

    /// A store that never touches disk
    pub fn in_memory() -> Self {
        DataStore {
            path: None,
            book: Book::default(),
        }
    }

    /// Apply `change` to a copy of the book and swap it in once it is on disk
    ///
    /// A failed change or a failed write leaves the store as it was.
    fn commit<T>(
        &mut self,
        change: impl FnOnce(&mut Book) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut next = self.book.clone();
        let out = change(&mut next)?;
        if let Some(path) = &self.path {
            write_book(path, &next)?;
        }
        self.book = next;
        Ok(out)
    }

    pub fn master(&self) -> &Sheet {
        &self.book.master
    }

    pub fn monthly(&self) -> &Sheet {
        &self.book.monthly
    }

    pub fn projects(&self) -> &[Record] {
        &self.book.master.rows
    }

    /// Sorted union of master and monthly headers
    pub fn columns(&self) -> Vec<String> {
        self.book
            .master
            .headers
            .iter()
            .chain(self.book.monthly.headers.iter())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn stats(&self) -> DashboardStats {
        stats::compute(&self.book.master, &self.book.monthly)
    }

    /// Ledger of one project, matched on trimmed name, ignoring case
    pub fn history(&self, project: &str) -> Option<&Sheet> {
        let key = self.book.ledger_key(project)?;
        self.book.ledgers.get(&key)
    }

    pub fn ledger_names(&self) -> impl Iterator<Item = &str> {
        self.book.ledgers.keys().map(String::as_str)
    }

    pub fn replace_master(&mut self, sheet: Sheet) -> Result<(), StoreError> {
        let rows = sheet.rows.len();
        self.commit(|book| {
            book.master = sheet;
            Ok(())
        })?;
        info!("master sheet replaced: {} rows", rows);
        Ok(())
    }

    pub fn replace_history(&mut self, project: &str, sheet: Sheet) -> Result<(), StoreError> {
        let key = self
            .book
            .ledger_key(project)
            .unwrap_or_else(|| project.trim().to_string());
        let rows = sheet.rows.len();
        self.commit(|book| {
            book.ledgers.insert(key.clone(), sheet);
            Ok(())
        })?;
        info!("ledger for {} replaced: {} rows", key, rows);
        Ok(())
    }

    /// Merge an uploaded monthly sheet into the stored one
    ///
    /// Outer merge on "Name of Project". Only columns the stored sheet does
    /// not already have are taken from the upload. An empty stored sheet is
    /// simply replaced.
    pub fn append_monthly(&mut self, upload: Sheet) -> Result<(), StoreError> {
        self.commit(|book| {
            if book.monthly.is_empty() {
                book.monthly = upload;
                return Ok(());
            }
            merge_monthly(&mut book.monthly, upload)
        })
    }

    /// Append a reading with its bill computed from the ledger history
    pub fn add_reading(&mut self, reading: NewReading) -> Result<Record, StoreError> {
        self.commit(|book| {
            let (key, ledger) = book.ledger_mut(&reading.project_name)?;
            let columns = LedgerColumns::resolve(&ledger.headers);
            let baseline = billing::latest_baseline(&ledger.rows, &columns)
                .ok_or(billing::PreviewError::NoBaseline)?;
            let out = baseline
                .inputs(reading.current_export, reading.current_import)
                .compute();

            let mut row = Record::new();
            for header in &ledger.headers {
                row.set(header.as_str(), Value::Null);
            }
            for (column, value) in &reading.extra {
                if ledger.has_column(column) {
                    row.set(column.as_str(), value.clone());
                }
            }
            let mut put = |column: &Option<String>, value: Value| {
                if let Some(column) = column {
                    row.set(column.as_str(), value);
                }
            };
            put(&columns.reading_date, Value::from(reading.date.clone()));
            put(&columns.meter_factor, Value::from(baseline.meter_factor));
            put(&columns.rate, Value::from(baseline.rate));
            put(&columns.export_current, Value::from(reading.current_export));
            put(&columns.export_previous, Value::from(baseline.previous_export));
            put(&columns.import_current, Value::from(reading.current_import));
            put(&columns.import_previous, Value::from(baseline.previous_import));
            write_breakdown(&mut put, &columns, &out);

            ledger.rows.push(row.clone());
            info!(
                "reading for {} on {} billed at {}",
                key, reading.date, out.bill
            );
            Ok(row)
        })
    }

    /// Merge edited values into the ledger row for `month_date`
    pub fn update_row(
        &mut self,
        project: &str,
        month_date: &str,
        data: &Record,
    ) -> Result<(), StoreError> {
        self.commit(|book| {
            let (key, ledger) = book.ledger_mut(project)?;
            let columns = LedgerColumns::resolve(&ledger.headers);
            let date_column = columns
                .reading_date
                .ok_or_else(|| StoreError::MissingColumn("month/date".to_string()))?;

            let wanted = month_date.trim();
            let row = ledger
                .rows
                .iter_mut()
                .find(|r| r.text(&date_column).trim() == wanted)
                .ok_or_else(|| StoreError::UnknownRow {
                    project: key,
                    month: wanted.to_string(),
                })?;
            for (column, value) in data.iter() {
                row.set(column.as_str(), value.clone());
            }
            for column in data.columns() {
                ledger.add_header(column);
            }
            Ok(())
        })
    }

    /// Monthly rows left-joined with master rows, cut to `selected` columns
    ///
    /// Rows join on the upper-cased, trimmed project name against the master
    /// company name. Monthly values win where both sheets share a column.
    /// Requested columns that neither sheet has are dropped; the request
    /// order is kept.
    pub fn report_sheet(&self, selected: &[String]) -> Sheet {
        let join_key = |r: &Record, column: &str| r.text(column).trim().to_uppercase();
        let mut master_by_key: HashMap<String, &Record> = HashMap::new();
        for row in &self.book.master.rows {
            master_by_key
                .entry(join_key(row, MASTER_JOIN_COLUMN))
                .or_insert(row);
        }

        let available: BTreeSet<&str> = self
            .book
            .monthly
            .headers
            .iter()
            .chain(self.book.master.headers.iter())
            .map(String::as_str)
            .collect();
        let mut headers: Vec<String> = Vec::new();
        for column in selected {
            if available.contains(column.as_str()) && !headers.contains(column) {
                headers.push(column.clone());
            }
        }

        let rows = self
            .book
            .monthly
            .rows
            .iter()
            .map(|monthly| {
                let master = master_by_key.get(&join_key(monthly, NAME_OF_PROJECT));
                headers
                    .iter()
                    .map(|column| {
                        let value = monthly
                            .get(column)
                            .or_else(|| master.and_then(|m| m.get(column)))
                            .cloned()
                            .unwrap_or(Value::Null);
                        (column.clone(), value)
                    })
                    .collect()
            })
            .collect();
        Sheet::new(headers, rows)
    }
}

/// Write the book next to `path` and rename it into place
fn write_book(path: &Path, book: &Book) -> Result<(), StoreError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let tmp = NamedTempFile::new_in(dir)?;
    let mut writer = BufWriter::new(GzEncoder::new(tmp.as_file(), Compression::default()));
    serde_json::to_writer(&mut writer, book)?;
    writer
        .into_inner()
        .map_err(|e| e.into_error())?
        .finish()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    debug!("store written to {}", path.display());
    Ok(())
}

/// Outer merge of `upload` into `existing` on "Name of Project"
fn merge_monthly(existing: &mut Sheet, upload: Sheet) -> Result<(), StoreError> {
    if !upload.has_column(NAME_OF_PROJECT) {
        return Err(StoreError::MissingColumn(NAME_OF_PROJECT.to_string()));
    }
    let new_columns: Vec<String> = upload
        .headers
        .iter()
        .filter(|h| !existing.has_column(h))
        .cloned()
        .collect();

    let mut by_name: HashMap<String, Record> = HashMap::new();
    let mut upload_order: Vec<String> = Vec::new();
    for row in upload.rows {
        let name = row.text(NAME_OF_PROJECT);
        if !by_name.contains_key(&name) {
            upload_order.push(name.clone());
            by_name.insert(name, row);
        }
    }

    existing.add_header(NAME_OF_PROJECT);
    for column in &new_columns {
        existing.add_header(column);
    }
    for row in existing.rows.iter_mut() {
        if let Some(incoming) = by_name.remove(&row.text(NAME_OF_PROJECT)) {
            for column in &new_columns {
                if let Some(value) = incoming.get(column) {
                    row.set(column.as_str(), value.clone());
                }
            }
        }
    }
    for name in upload_order {
        if let Some(incoming) = by_name.remove(&name) {
            let mut row = Record::new();
            row.set(NAME_OF_PROJECT, name.clone());
            for column in &new_columns {
                if let Some(value) = incoming.get(column) {
                    row.set(column.as_str(), value.clone());
                }
            }
            existing.rows.push(row);
        }
    }
    info!(
        "monthly sheet merged: {} new columns, {} rows",
        new_columns.len(),
        existing.rows.len()
    );
    Ok(())
}

fn write_breakdown(
    put: &mut impl FnMut(&Option<String>, Value),
    columns: &LedgerColumns,
    out: &BillBreakdown,
) {
    put(&columns.export_difference, Value::from(out.diff_export));
    put(&columns.export_kwh, Value::from(out.kwh_export));
    put(&columns.import_difference, Value::from(out.diff_import));
    put(&columns.import_kwh, Value::from(out.kwh_import));
    put(&columns.net_units, Value::from(out.net_units));
    put(&columns.bill_amount, Value::from(out.bill));
}

impl RowSink for DataStore {
    type Error = StoreError;

    fn update_row(
        &mut self,
        project: &str,
        month_date: &str,
        data: &Record,
    ) -> Result<(), StoreError> {
        DataStore::update_row(self, project, month_date, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sheet(headers: &[&str], rows: Vec<Vec<Value>>) -> Sheet {
        let headers: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
        let rows = rows
            .into_iter()
            .map(|values| headers.iter().cloned().zip(values).collect())
            .collect();
        Sheet::new(headers, rows)
    }

    #[test]
    fn columns_are_a_sorted_union() {
        let mut store = DataStore::in_memory();
        store
            .replace_master(sheet(&["Zeta", "Alpha"], vec![]))
            .unwrap();
        store
            .append_monthly(sheet(&["Alpha", "Mid"], vec![]))
            .unwrap();
        assert_eq!(store.columns(), vec!["Alpha", "Mid", "Zeta"]);
    }

    #[test]
    fn append_is_an_outer_merge_on_project_name() {
        let mut store = DataStore::in_memory();
        store
            .append_monthly(sheet(
                &[NAME_OF_PROJECT, "Apr-25 - Generation"],
                vec![vec![json!("A"), json!(10)], vec![json!("B"), json!(20)]],
            ))
            .unwrap();
        store
            .append_monthly(sheet(
                &[NAME_OF_PROJECT, "Apr-25 - Generation", "May-25 - Generation"],
                vec![
                    vec![json!("B"), json!(999), json!(21)],
                    vec![json!("C"), json!(999), json!(30)],
                ],
            ))
            .unwrap();

        let monthly = store.monthly();
        assert_eq!(monthly.rows.len(), 3);
        assert_eq!(monthly.rows[0].get("May-25 - Generation"), None);
        assert_eq!(monthly.rows[1].number("Apr-25 - Generation"), 20.0);
        assert_eq!(monthly.rows[1].number("May-25 - Generation"), 21.0);
        assert_eq!(monthly.rows[2].text(NAME_OF_PROJECT), "C");
        assert_eq!(monthly.rows[2].get("Apr-25 - Generation"), None);
    }

    #[test]
    fn history_lookup_ignores_case_and_padding() {
        let mut store = DataStore::in_memory();
        store
            .replace_history("Alpha Solar", sheet(&["MONTH"], vec![]))
            .unwrap();
        assert!(store.history("  alpha solar ").is_some());
        assert!(store.history("beta").is_none());
    }

    #[test]
    fn report_joins_and_keeps_request_order() {
        let mut store = DataStore::in_memory();
        store
            .replace_master(sheet(
                &[MASTER_JOIN_COLUMN, "Capacity"],
                vec![vec![json!(" alpha "), json!(5)]],
            ))
            .unwrap();
        store
            .append_monthly(sheet(
                &[NAME_OF_PROJECT, "Payment"],
                vec![vec![json!("ALPHA"), json!(100)], vec![json!("Other"), json!(1)]],
            ))
            .unwrap();
        let selected = vec![
            "Capacity".to_string(),
            "Bogus".to_string(),
            NAME_OF_PROJECT.to_string(),
        ];
        let report = store.report_sheet(&selected);
        assert_eq!(report.headers, vec!["Capacity", NAME_OF_PROJECT]);
        assert_eq!(report.rows[0].number("Capacity"), 5.0);
        assert_eq!(report.rows[1].get("Capacity"), Some(&Value::Null));
    }
}
