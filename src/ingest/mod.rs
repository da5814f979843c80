//! Ingestion: decode a workbook, pick the simulation sheets, and bound the payload.

pub mod budget;
pub mod classifier;
pub mod decoder;

pub use budget::{BudgetedPayload, PayloadBudgeter};
pub use classifier::{
    classify, select, Classification, MatchRule, MatchedSheet, Selection, SheetRole,
    SheetVocabulary, VocabularyEntry,
};
pub use decoder::{CalamineDecoder, SheetDecoder};
