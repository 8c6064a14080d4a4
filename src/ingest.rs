#![cfg(feature = "web")]

use crate::store::Sheet;
use crate::value::{Record, try_number};
use calamine::{Data, Reader, open_workbook_auto_from_rs};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::collections::HashMap;
use std::io::Cursor;
use thiserror::Error;

/// Serial-number column every master upload must carry
pub const MASTER_SERIAL_COLUMN: &str = "SR. No.";

/// How far down a monthly upload the header row may sit
const HEADER_SCAN_ROWS: usize = 20;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("could not open workbook: {0}")]
    Workbook(#[from] calamine::Error),
    #[error("workbook has no worksheets")]
    NoSheets,
    #[error("worksheet is empty")]
    Empty,
    #[error("no 'Sr. No' header row in the first {HEADER_SCAN_ROWS} rows")]
    HeaderNotFound,
    #[error("upload has no '{0}' column")]
    MissingColumn(String),
}

/// Load the master project list
///
/// The first row is the header. Rows whose "SR. No." cell is not a number
/// (notes, totals, blank padding) are dropped.
pub fn read_master(bytes: &[u8]) -> Result<Sheet, IngestError> {
    let rows = first_sheet_rows(bytes)?;
    let (header_row, data) = rows.split_first().ok_or(IngestError::Empty)?;
    let headers = dedupe(
        header_row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let text = header_text(cell);
                if text.is_empty() {
                    format!("Column_{}", i)
                } else {
                    text
                }
            })
            .collect(),
    );
    let serial = headers
        .iter()
        .position(|h| h == MASTER_SERIAL_COLUMN)
        .ok_or_else(|| IngestError::MissingColumn(MASTER_SERIAL_COLUMN.to_string()))?;
    Ok(build_sheet(headers, data, Some(serial)))
}

/// Load a monthly report with a two-row header
///
/// Monthly reports carry a title block, then a header row holding "Sr. No"
/// with month groups ("April 2025") above a sub-header ("Generation",
/// "Payment"). The two rows are merged into "April-25 - Generation"
/// style names and only numbered rows are kept.
pub fn read_monthly(bytes: &[u8]) -> Result<Sheet, IngestError> {
    let rows = first_sheet_rows(bytes)?;
    let header_idx = rows
        .iter()
        .take(HEADER_SCAN_ROWS)
        .position(|row| {
            row.iter().any(|cell| {
                let text = cell_text(cell).to_lowercase();
                text.contains("sr.no") || text.contains("sr. no")
            })
        })
        .ok_or(IngestError::HeaderNotFound)?;

    let no_sub_header = Vec::new();
    let sub = rows.get(header_idx + 1).unwrap_or(&no_sub_header);
    let headers = merge_header_rows(&rows[header_idx], sub);
    let serial = headers
        .iter()
        .position(|h| h.contains("Sr") && h.contains("No"))
        .unwrap_or(0);
    let data = rows.get(header_idx + 2..).unwrap_or(&[]);
    Ok(build_sheet(headers, data, Some(serial)))
}

/// Load a plain table: one header row, then data
pub fn read_table(bytes: &[u8]) -> Result<Sheet, IngestError> {
    let rows = first_sheet_rows(bytes)?;
    let (header_row, data) = rows.split_first().ok_or(IngestError::Empty)?;
    let headers = dedupe(
        header_row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let text = header_text(cell);
                if text.is_empty() {
                    format!("Column_{}", i)
                } else {
                    text
                }
            })
            .collect(),
    );
    Ok(build_sheet(headers, data, None))
}

fn first_sheet_rows(bytes: &[u8]) -> Result<Vec<Vec<Data>>, IngestError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(IngestError::NoSheets)?;
    let range = workbook.worksheet_range(&name)?;
    Ok(range.rows().map(|row| row.to_vec()).collect())
}

fn build_sheet(headers: Vec<String>, data: &[Vec<Data>], serial: Option<usize>) -> Sheet {
    let rows = data
        .iter()
        .filter(|row| match serial {
            Some(idx) => row
                .get(idx)
                .map(cell_value)
                .as_ref()
                .and_then(try_number)
                .is_some(),
            None => row.iter().any(|c| !matches!(c, Data::Empty)),
        })
        .map(|row| {
            headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.clone(), row.get(i).map(cell_value).unwrap_or(Value::Null)))
                .collect::<Record>()
        })
        .collect();
    Sheet::new(headers, rows)
}

/// Merge a group header row and its sub-header row into flat column names
///
/// A blank group cell above a filled sub-header cell belongs to the group
/// to its left (merged cells come through blank). Names are
/// "Group - Sub", "Group", "Sub", or "Column_{n}" when both are blank.
pub fn merge_header_rows(top: &[Data], sub: &[Data]) -> Vec<String> {
    let width = top.len().max(sub.len());
    let mut names = Vec::with_capacity(width);
    let mut group = String::new();
    for i in 0..width {
        let top_val = top.get(i).map(header_text).unwrap_or_default();
        let sub_val = sub.get(i).map(header_text).unwrap_or_default();
        let top_val = if top_val.is_empty() && !sub_val.is_empty() {
            group.clone()
        } else {
            group = top_val.clone();
            top_val
        };

        let name = match (top_val.is_empty(), sub_val.is_empty()) {
            (false, false) => format!("{} - {}", top_val, sub_val),
            (false, true) => top_val,
            (true, false) => sub_val,
            (true, true) => format!("Column_{}", names.len()),
        };
        names.push(name);
    }
    dedupe(names)
}

/// Suffix repeated names with `_2`, `_3`, ...
fn dedupe(names: Vec<String>) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    names
        .into_iter()
        .map(|name| {
            let count = counts.entry(name.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                name
            } else {
                format!("{}_{}", name, count)
            }
        })
        .collect()
}

/// Header text of a cell; dates render as "April-25", placeholders as blank
fn header_text(cell: &Data) -> String {
    let text = match cell {
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%B-%y").to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(s) => parse_iso(s)
            .map(|d| d.format("%B-%y").to_string())
            .unwrap_or_else(|| s.clone()),
        other => cell_text(other),
    };
    let text = text.trim();
    if text.contains("Unnamed") || text == "nan" {
        String::new()
    } else {
        text.to_string()
    }
}

fn parse_iso(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::Error(_) | Data::Empty => String::new(),
    }
}

/// JSON value of a data cell
fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::String(s) => Value::from(s.trim()),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => Value::from(*f as i64),
        Data::Float(f) => Value::from(*f),
        Data::Int(i) => Value::from(*i),
        Data::Bool(b) => Value::from(*b),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| Value::from(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::from(s.clone()),
    }
}
