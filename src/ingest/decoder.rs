//! Workbook decoding (xlsx, xlsm, xlsb, xls, ods)
//!
//! Turns an uploaded workbook into named tables of row records. The first row
//! of each sheet is the header; every following non-blank row becomes a record
//! keyed by those headers. Cells missing from a row decode as empty.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader, Sheets};
use tracing::{debug, warn};

use crate::error::{AnalysisError, AnalysisResult};
use crate::models::{CellValue, Row, Sheet, SheetStore};

/// Decoder seam. The pipeline only needs sheet names and rows.
pub trait SheetDecoder: Send + Sync {
    fn decode(&self, file_name: &str, bytes: &[u8]) -> AnalysisResult<SheetStore>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CalamineDecoder;

impl CalamineDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl SheetDecoder for CalamineDecoder {
    fn decode(&self, file_name: &str, bytes: &[u8]) -> AnalysisResult<SheetStore> {
        let mut workbook: Sheets<_> = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| AnalysisError::decode(file_name, e))?;

        let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
        let mut sheets = Vec::with_capacity(sheet_names.len());

        for sheet_name in &sheet_names {
            let range = workbook
                .worksheet_range(sheet_name)
                .map_err(|e| AnalysisError::decode(file_name, format!("sheet '{}': {}", sheet_name, e)))?;

            let mut rows_iter = range.rows();
            let headers = match rows_iter.next() {
                Some(header_row) => header_names(header_row),
                None => {
                    debug!(sheet = %sheet_name, "empty sheet");
                    sheets.push(Sheet::new(sheet_name.clone(), Vec::new()));
                    continue;
                }
            };

            let mut rows = Vec::new();
            for cells in rows_iter {
                let mut row = Row::new();
                for (idx, header) in headers.iter().enumerate() {
                    let value = cells.get(idx).map(cell_value).unwrap_or(CellValue::Empty);
                    row.push(header.clone(), value);
                }
                if !row.is_blank() {
                    rows.push(row);
                }
            }

            debug!(sheet = %sheet_name, rows = rows.len(), columns = headers.len(), "decoded sheet");
            sheets.push(Sheet::new(sheet_name.clone(), rows));
        }

        if sheets.is_empty() {
            warn!(file = %file_name, "workbook decoded without sheets");
        }

        Ok(SheetStore::new(sheets))
    }
}

/// Header labels with blanks named `__EMPTY`, `__EMPTY_1`, ... and repeats
/// suffixed `_1`, `_2`, ... so every field key in a row is unique.
fn header_names(cells: &[Data]) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(cells.len());
    let mut blanks = 0usize;

    for cell in cells {
        let raw = match cell_value(cell) {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) => format_number(n),
            CellValue::Bool(b) => if b { "TRUE" } else { "FALSE" }.to_string(),
        };

        let base = if raw.is_empty() {
            let name = if blanks == 0 {
                "__EMPTY".to_string()
            } else {
                format!("__EMPTY_{}", blanks)
            };
            blanks += 1;
            name
        } else {
            raw
        };

        let mut candidate = base.clone();
        let mut suffix = 1;
        while names.contains(&candidate) {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        names.push(candidate);
    }

    names
}

fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) if s.is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(n) => CellValue::Number(*n),
        Data::Int(n) => CellValue::Number(*n as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        // Serial day number, same as the workbook stores it
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(format!("#{:?}", e)),
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_repeated_headers_get_unique_names() {
        let cells = vec![
            Data::String("Resource".into()),
            Data::Empty,
            Data::String("Value".into()),
            Data::String("Value".into()),
            Data::Empty,
            Data::Int(2024),
        ];
        assert_eq!(
            header_names(&cells),
            vec!["Resource", "__EMPTY", "Value", "Value_1", "__EMPTY_1", "2024"]
        );
    }

    #[test]
    fn cells_convert_to_loose_values() {
        assert_eq!(cell_value(&Data::Int(3)), CellValue::Number(3.0));
        assert_eq!(cell_value(&Data::String(String::new())), CellValue::Empty);
        assert_eq!(cell_value(&Data::Bool(true)), CellValue::Bool(true));
        assert_eq!(
            cell_value(&Data::String("Packer".into())),
            CellValue::Text("Packer".into())
        );
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let err = CalamineDecoder::new()
            .decode("broken.xlsx", b"definitely not a workbook")
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Decode { ref file, .. } if file == "broken.xlsx"));
    }
}
