//! In-place editing of a project's billing ledger
//!
//! Edits land in memory immediately and mark the row as modified. Derived
//! fields follow a fixed dependency chain (readings, MF, rate → difference →
//! kWh → net → bill) and are rewritten by [`recompute_row`] after any edit
//! to one of its inputs. Rows are persisted one at a time through a
//! [`RowSink`]; nothing prevents two rows being saved at once, and the last
//! write wins.

use crate::billing::{BillInputs, MeterPair};
use crate::columns::LedgerColumns;
use crate::value::Record;
use log::debug;
use serde_json::Value;
use std::error::Error as StdError;
use thiserror::Error;

/// Destination for a saved ledger row
pub trait RowSink {
    type Error: Into<Box<dyn StdError + Send + Sync>>;

    fn update_row(&mut self, project: &str, month_date: &str, data: &Record)
    -> Result<(), Self::Error>;
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("row {0} is out of range")]
    RowOutOfRange(usize),
    #[error("row {0} has no reading month to save against")]
    MissingReadingDate(usize),
    #[error("failed to save row: {0}")]
    Persist(Box<dyn StdError + Send + Sync>),
}

/// A ledger row plus its pending-save flag
///
/// `stored_month` is the reading date the row is stored under, so an edit
/// to the date column itself still saves onto the right row.
#[derive(Clone, Debug, PartialEq)]
pub struct EditableRow {
    pub record: Record,
    stored_month: String,
    modified: bool,
}

impl EditableRow {
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn stored_month(&self) -> &str {
        &self.stored_month
    }
}

/// One project's ledger, open for editing
#[derive(Clone, Debug)]
pub struct LedgerSession {
    project: String,
    headers: Vec<String>,
    columns: LedgerColumns,
    rows: Vec<EditableRow>,
}

impl LedgerSession {
    pub fn new(project: impl Into<String>, headers: Vec<String>, rows: Vec<Record>) -> Self {
        let columns = LedgerColumns::resolve(&headers);
        let rows = rows
            .into_iter()
            .map(|record| EditableRow {
                stored_month: record.text_in(columns.reading_date.as_deref()),
                record,
                modified: false,
            })
            .collect();
        LedgerSession {
            project: project.into(),
            headers,
            columns,
            rows,
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn columns(&self) -> &LedgerColumns {
        &self.columns
    }

    pub fn rows(&self) -> &[EditableRow] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&EditableRow> {
        self.rows.get(index)
    }

    pub fn is_modified(&self, index: usize) -> bool {
        self.rows.get(index).is_some_and(|r| r.modified)
    }

    /// Indices of rows with unsaved edits
    pub fn modified_rows(&self) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.modified)
            .map(|(i, _)| i)
            .collect()
    }

    /// Write one cell and refresh the row's derived fields when needed
    pub fn edit_cell(
        &mut self,
        index: usize,
        column: &str,
        value: impl Into<String>,
    ) -> Result<(), LedgerError> {
        let row = self
            .rows
            .get_mut(index)
            .ok_or(LedgerError::RowOutOfRange(index))?;
        row.record.set(column, Value::String(value.into()));
        row.modified = true;
        if self.columns.is_input(column) {
            recompute_row(&mut row.record, &self.columns);
        }
        Ok(())
    }

    /// Persist one row; the modified flag clears only if the sink succeeds
    ///
    /// The row is addressed by the month it was last stored under. After a
    /// successful save the row's current month becomes that key.
    pub fn save_row<K: RowSink>(&mut self, index: usize, sink: &mut K) -> Result<(), LedgerError> {
        let row = self
            .rows
            .get_mut(index)
            .ok_or(LedgerError::RowOutOfRange(index))?;
        let current = row.record.text_in(self.columns.reading_date.as_deref());
        let month = if row.stored_month.trim().is_empty() {
            current.clone()
        } else {
            row.stored_month.clone()
        };
        if month.trim().is_empty() {
            return Err(LedgerError::MissingReadingDate(index));
        }
        sink.update_row(&self.project, &month, &row.record)
            .map_err(|e| LedgerError::Persist(e.into()))?;
        row.modified = false;
        row.stored_month = current;
        debug!("saved ledger row {} ({}) for {}", index, month, self.project);
        Ok(())
    }
}

/// Rewrite every derived billing field of a row from its inputs
///
/// Returns `false` and leaves the row untouched when it lacks any required
/// column. Optional derived columns that are absent are skipped.
pub fn recompute_row(record: &mut Record, columns: &LedgerColumns) -> bool {
    if !columns.supports_recompute() {
        return false;
    }
    let inputs = BillInputs {
        meter_factor: record.number_in(columns.meter_factor.as_deref()),
        rate: record.number_in(columns.rate.as_deref()),
        export: MeterPair {
            current: record.number_in(columns.export_current.as_deref()),
            previous: record.number_in(columns.export_previous.as_deref()),
        },
        import: MeterPair {
            current: record.number_in(columns.import_current.as_deref()),
            previous: record.number_in(columns.import_previous.as_deref()),
        },
    };
    let out = inputs.compute();

    let fixed = [
        (&columns.export_difference, out.diff_export),
        (&columns.export_kwh, out.kwh_export),
        (&columns.import_difference, out.diff_import),
        (&columns.import_kwh, out.kwh_import),
        (&columns.net_units, out.net_units),
    ];
    for (column, value) in fixed {
        if let Some(column) = column {
            record.set(column.as_str(), format!("{:.2}", value));
        }
    }
    if let Some(column) = &columns.bill_amount {
        record.set(column.as_str(), format!("{}", out.bill as i64));
    }
    true
}
