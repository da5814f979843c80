//! SimConsult Library
//!
//! Turns a discrete-event simulation workbook into a validated executive
//! report: decode → classify → budget → generative engine → validate → render.
//! Exposed as a library so the binary and integration tests share one pipeline.

pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod session;

pub use config::AnalyzerConfig;
pub use error::{AnalysisError, AnalysisResult, ErrorKind};
pub use models::{CellValue, Row, Sheet, SheetStore};
pub use pipeline::ReportPipeline;
pub use session::{AnalysisOutcome, AnalysisSession, ResetHandle, SessionSnapshot, SessionState};
