#![cfg(feature = "web")]

use crate::store::Sheet;
use rust_xlsxwriter::{Format, Workbook};
use serde_json::Value;
use std::error::Error;

/// File name offered for the report download
pub const REPORT_FILENAME: &str = "Office_Report.xlsx";
/// Worksheet the report is written to
pub const REPORT_SHEET: &str = "Custom Report";
/// MIME type of an xlsx workbook
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Convert a sheet to XLSX format
///
/// Writes a bold header row, then one row per record. Numbers stay numeric
/// so the office can sum them in Excel; text and booleans are written as-is
/// and empty cells are left blank.
///
/// # Arguments
/// * `sheet` - The report to write
///
/// # Returns
/// * `Result<Vec<u8>, Box<dyn Error>>` - XLSX file content as bytes or an error
pub fn to_xlsx(sheet: &Sheet) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(REPORT_SHEET)?;
    let bold = Format::new().set_bold();

    for (c, header) in sheet.headers.iter().enumerate() {
        worksheet.write_string_with_format(0, u16::try_from(c)?, header.as_str(), &bold)?;
    }

    for (r, record) in sheet.rows.iter().enumerate() {
        let row = u32::try_from(r + 1)?;
        for (c, header) in sheet.headers.iter().enumerate() {
            let col = u16::try_from(c)?;
            match record.get(header) {
                Some(Value::Number(n)) => {
                    worksheet.write_number(row, col, n.as_f64().unwrap_or(0.0))?;
                }
                Some(Value::String(s)) => {
                    worksheet.write_string(row, col, s.as_str())?;
                }
                Some(Value::Bool(b)) => {
                    worksheet.write_boolean(row, col, *b)?;
                }
                Some(other @ (Value::Array(_) | Value::Object(_))) => {
                    worksheet.write_string(row, col, other.to_string())?;
                }
                Some(Value::Null) | None => {}
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}
