use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single row pulled from a sheet
///
/// Maps column names to scalar values (string, number, or empty). Column
/// order is the order of the source sheet and is preserved through
/// serialization. The schema is not fixed: callers look columns up by the
/// roles resolved in [`crate::columns`], never by hard-coded names.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Record(Map::new())
    }

    /// Column names in source order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    /// Insert or overwrite a cell, keeping the position of an existing column
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(column.into(), value.into());
    }

    /// Numeric value of a cell, `0.0` when missing or unparsable
    pub fn number(&self, column: &str) -> f64 {
        self.get(column).and_then(try_number).unwrap_or(0.0)
    }

    /// Numeric value of a cell, `None` when missing or not a number
    pub fn try_number(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(try_number)
    }

    /// Display text of a cell, empty when missing
    pub fn text(&self, column: &str) -> String {
        self.get(column).map(display_text).unwrap_or_default()
    }

    /// Numeric value of an optional column, `0.0` when the column is unresolved
    pub fn number_in(&self, column: Option<&str>) -> f64 {
        column.map(|c| self.number(c)).unwrap_or(0.0)
    }

    /// Display text of an optional column, empty when the column is unresolved
    pub fn text_in(&self, column: Option<&str>) -> String {
        column.map(|c| self.text(c)).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Record(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Record(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Parse a user-entered number
///
/// Strips thousands-separator commas before parsing. Anything that is not a
/// finite number parses to `0.0` instead of failing.
pub fn parse_number(text: &str) -> f64 {
    parse_strict(text).unwrap_or(0.0)
}

/// Numeric reading of a JSON cell, `None` when the cell holds no number
pub fn try_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_strict(s),
        _ => None,
    }
}

fn parse_strict(text: &str) -> Option<f64> {
    let cleaned = text.trim().replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Render a cell the way a sheet would show it
///
/// Whole numbers print without a trailing `.0`, so `12` read back from a
/// spreadsheet still matches the text `"12"`.
pub fn display_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Round to two decimals for display totals
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
