//! Sheet data model shared by the decoder, classifier and budgeter.

use serde::ser::{Serialize, SerializeMap, Serializer};

/// A single decoded cell. Source spreadsheets are loosely typed, so a column
/// can mix text, numbers and blanks.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Empty => serializer.serialize_str(""),
            Self::Text(s) => serializer.serialize_str(s),
            // Integral values print without a trailing ".0" to keep the payload compact
            Self::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
                serializer.serialize_i64(*n as i64)
            }
            Self::Number(n) if n.is_finite() => serializer.serialize_f64(*n),
            Self::Number(_) => serializer.serialize_none(),
            Self::Bool(b) => serializer.serialize_bool(*b),
        }
    }
}

/// One data row keyed by header, in header order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, CellValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.push(field, value);
        self
    }

    pub fn push(&mut self, field: impl Into<String>, value: impl Into<CellValue>) {
        self.cells.push((field.into(), value.into()));
    }

    pub fn get(&self, field: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// True when every cell is blank.
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, value)| value.is_empty())
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (name, value) in &self.cells {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// One named table of row records.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Sheet {
    pub name: String,
    #[serde(rename = "data")]
    pub rows: Vec<Row>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }
}

/// Ordered collection of decoded sheets for one uploaded workbook.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetStore {
    sheets: Vec<Sheet>,
}

impl SheetStore {
    pub fn new(sheets: Vec<Sheet>) -> Self {
        Self { sheets }
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sheets.iter().any(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    pub fn total_rows(&self) -> usize {
        self.sheets.iter().map(|s| s.rows.len()).sum()
    }
}

impl FromIterator<Sheet> for SheetStore {
    fn from_iter<I: IntoIterator<Item = Sheet>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_serializes_in_header_order() {
        let row = Row::new()
            .with("Resource", "Packer")
            .with("Utilization", 0.92)
            .with("Count", 4.0)
            .with("Note", CellValue::Empty);
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(
            json,
            r#"{"Resource":"Packer","Utilization":0.92,"Count":4,"Note":""}"#
        );
    }

    #[test]
    fn sheet_serializes_rows_under_data() {
        let sheet = Sheet::new("S", vec![Row::new().with("a", true)]);
        let json = serde_json::to_string(&sheet).unwrap();
        assert_eq!(json, r#"{"name":"S","data":[{"a":true}]}"#);
    }

    #[test]
    fn blank_rows_are_detected() {
        let row = Row::new().with("a", "").with("b", CellValue::Empty);
        assert!(row.is_blank());
        assert!(!Row::new().with("a", 0.0).is_blank());
    }
}
