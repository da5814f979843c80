//! Report side of the pipeline: request construction, the engine gateway,
//! response validation and rendering.

pub mod gateway;
pub mod model;
pub mod render;
pub mod request;
pub mod validator;

pub use gateway::{GeminiGateway, ReportGateway};
pub use model::{
    ChartPoint, Charts, Insight, InsightKind, Kpi, Priority, Recommendation, ReportSummary,
    SimulationReport, Trend,
};
pub use render::{ReportRenderer, TextRenderer};
pub use request::{AnalysisRequest, ChartPolicy, ReportRequestBuilder};
pub use validator::ReportValidator;
