//! Payload Budgeter
//!
//! Serializes the selected sheets to one JSON string and cuts it to a
//! character ceiling. The ceiling is a proxy for the engine's request-size
//! limit, not a token count.
//!
//! The cut is a hard character cut: it is not row-aware and can end the
//! payload in the middle of a record, leaving invalid JSON behind it. The
//! engine is told when this happened. That loss is accepted, not an error.

use crate::error::{AnalysisError, AnalysisResult};
use crate::models::Sheet;

#[derive(Debug, Clone)]
pub struct BudgetedPayload {
    /// Serialized sheets, at most `max_chars` characters
    pub text: String,
    /// Length of the full serialization, in characters
    pub full_chars: usize,
    /// Ceiling that was applied
    pub max_chars: usize,
}

impl BudgetedPayload {
    pub fn truncated(&self) -> bool {
        self.full_chars > self.max_chars
    }

    pub fn chars(&self) -> usize {
        self.full_chars.min(self.max_chars)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PayloadBudgeter {
    max_chars: usize,
}

impl PayloadBudgeter {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn budget(&self, sheets: &[&Sheet]) -> AnalysisResult<BudgetedPayload> {
        // Unreachable in practice: serde_json only fails on non-string map keys
        // or a Serialize impl that errors. Row keys are header strings and
        // CellValue writes non-finite numbers as null. Reported as Decode
        // because the only input here is decoded cell content.
        let full = serde_json::to_string(sheets)
            .map_err(|e| AnalysisError::decode("sheet payload", e))?;
        Ok(self.cut(full))
    }

    fn cut(&self, full: String) -> BudgetedPayload {
        let full_chars = full.chars().count();
        let text = if full_chars <= self.max_chars {
            full
        } else {
            let end = full
                .char_indices()
                .nth(self.max_chars)
                .map(|(idx, _)| idx)
                .unwrap_or(full.len());
            let mut full = full;
            full.truncate(end);
            full
        };

        BudgetedPayload {
            text,
            full_chars,
            max_chars: self.max_chars,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Row;

    fn sheets() -> Vec<Sheet> {
        vec![
            Sheet::new(
                "AcrossReplicationsSummary",
                vec![Row::new().with("Resource", "Packer").with("Utilization", 0.92)],
            ),
            Sheet::new(
                "DiscreteTimeStatsByRep",
                vec![Row::new().with("Queue", "InputBuffer").with("WaitTime", 12.4)],
            ),
        ]
    }

    #[test]
    fn payload_below_limit_is_unchanged() {
        let sheets = sheets();
        let refs: Vec<&Sheet> = sheets.iter().collect();
        let full = serde_json::to_string(&refs).unwrap();

        let payload = PayloadBudgeter::new(500_000).budget(&refs).unwrap();
        assert_eq!(payload.text, full);
        assert!(!payload.truncated());
        assert_eq!(payload.full_chars, full.chars().count());
    }

    #[test]
    fn payload_is_cut_to_the_limit() {
        let sheets = sheets();
        let refs: Vec<&Sheet> = sheets.iter().collect();
        for max in [0, 1, 10, 57, 100] {
            let payload = PayloadBudgeter::new(max).budget(&refs).unwrap();
            assert!(payload.text.chars().count() <= max);
            assert!(payload.truncated());
        }
    }

    #[test]
    fn payload_at_exact_limit_is_not_truncated() {
        let sheets = sheets();
        let refs: Vec<&Sheet> = sheets.iter().collect();
        let full_len = serde_json::to_string(&refs).unwrap().chars().count();

        let payload = PayloadBudgeter::new(full_len).budget(&refs).unwrap();
        assert!(!payload.truncated());
        assert_eq!(payload.text.chars().count(), full_len);
    }

    #[test]
    fn non_finite_cells_serialize_as_null() {
        let sheets = vec![Sheet::new(
            "CounterStatsByRep",
            vec![Row::new()
                .with("Mean", f64::NAN)
                .with("Max", f64::INFINITY)
                .with("", "blank header")],
        )];
        let refs: Vec<&Sheet> = sheets.iter().collect();
        let payload = PayloadBudgeter::new(500_000).budget(&refs).unwrap();
        assert_eq!(
            payload.text,
            r#"[{"name":"CounterStatsByRep","data":[{"Mean":null,"Max":null,"":"blank header"}]}]"#
        );
    }

    #[test]
    fn cut_respects_multibyte_characters() {
        let sheets = vec![Sheet::new(
            "Utilización",
            vec![Row::new().with("Recurso", "Máquina ñ")],
        )];
        let refs: Vec<&Sheet> = sheets.iter().collect();
        let payload = PayloadBudgeter::new(14).budget(&refs).unwrap();
        assert_eq!(payload.text.chars().count(), 14);
        assert_eq!(payload.text, "[{\"name\":\"Util");
    }
}
