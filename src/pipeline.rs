//! Analysis Pipeline
//!
//! classify → budget → build request → gateway → validate, for one workbook.
//! Strictly sequential; the gateway call is the only await point.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::AnalyzerConfig;
use crate::error::{AnalysisError, AnalysisResult};
use crate::ingest::{classify, select, PayloadBudgeter, SheetVocabulary};
use crate::models::SheetStore;
use crate::report::{
    AnalysisRequest, ReportGateway, ReportRequestBuilder, ReportValidator, SimulationReport,
};

/// How much of a rejected response goes into the log.
const LOGGED_RESPONSE_CHARS: usize = 2_000;

pub struct ReportPipeline {
    vocabulary: SheetVocabulary,
    budgeter: PayloadBudgeter,
    builder: ReportRequestBuilder,
    gateway: Arc<dyn ReportGateway>,
}

impl ReportPipeline {
    pub fn new(config: &AnalyzerConfig, gateway: Arc<dyn ReportGateway>) -> Self {
        Self {
            vocabulary: config.vocabulary.clone(),
            budgeter: PayloadBudgeter::new(config.max_payload_chars),
            builder: ReportRequestBuilder::new(config.chart_policy),
            gateway,
        }
    }

    pub fn vocabulary(&self) -> &SheetVocabulary {
        &self.vocabulary
    }

    /// Everything up to the engine call. Pure apart from logging.
    pub fn prepare(&self, store: &SheetStore) -> AnalysisResult<AnalysisRequest> {
        if store.is_empty() {
            return Err(AnalysisError::NoReadableData);
        }

        let classification = classify(store, &self.vocabulary);
        let selection = select(store, &classification);
        if selection.fallback {
            warn!(
                sheets = store.len(),
                "no known simulation sheets; sending every sheet"
            );
        } else {
            debug!(
                matched = ?classification.matched_names(),
                missing = ?classification.missing_ids,
                "classified sheets"
            );
        }

        let payload = self.budgeter.budget(&selection.sheets)?;
        if payload.truncated() {
            warn!(
                full_chars = payload.full_chars,
                max_chars = payload.max_chars,
                "payload truncated to budget"
            );
        }

        let request = self
            .builder
            .build(store, &classification, &selection, payload);
        info!(
            request_id = %request.id,
            sheets = request.selected_sheets.len(),
            payload_chars = request.payload_chars,
            truncated = request.payload_truncated,
            "analysis request built"
        );
        Ok(request)
    }

    /// Raw engine text. Empty responses are logged here.
    pub async fn request_report(&self, request: &AnalysisRequest) -> AnalysisResult<String> {
        match self.gateway.generate(request).await {
            Ok(text) if text.trim().is_empty() => {
                warn!(request_id = %request.id, "engine returned blank text");
                Err(AnalysisError::EmptyResponse)
            }
            Ok(text) => Ok(text),
            Err(e) => {
                warn!(request_id = %request.id, kind = %e.kind(), error = %e, "gateway call failed");
                Err(e)
            }
        }
    }

    /// Check `raw` against the report shape and this request's sheets.
    pub fn validate(&self, request: &AnalysisRequest, raw: &str) -> AnalysisResult<SimulationReport> {
        let validator = ReportValidator::new(
            request.sheet_names_detected.iter().cloned(),
            request.chart_policy,
        );
        match validator.validate(raw) {
            Ok(report) => {
                info!(
                    request_id = %request.id,
                    kpis = report.kpis.len(),
                    insights = report.insights.len(),
                    recommendations = report.recommendations.len(),
                    "report accepted"
                );
                Ok(report)
            }
            Err(e) => {
                let preview: String = raw.chars().take(LOGGED_RESPONSE_CHARS).collect();
                warn!(
                    request_id = %request.id,
                    error = %e,
                    response = %preview,
                    "engine response rejected"
                );
                Err(e)
            }
        }
    }

    pub async fn analyze(&self, store: &SheetStore) -> AnalysisResult<SimulationReport> {
        let request = self.prepare(store)?;
        let raw = self.request_report(&request).await?;
        self.validate(&request, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Row, Sheet};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct CannedGateway {
        response: AnalysisResult<String>,
        seen_prompts: Mutex<Vec<String>>,
    }

    impl CannedGateway {
        fn new(response: AnalysisResult<String>) -> Arc<Self> {
            Arc::new(Self {
                response,
                seen_prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ReportGateway for CannedGateway {
        async fn generate(&self, request: &AnalysisRequest) -> AnalysisResult<String> {
            self.seen_prompts.lock().push(request.prompt.clone());
            self.response.clone()
        }
    }

    fn store() -> SheetStore {
        SheetStore::new(vec![Sheet::new(
            "AcrossReplicationsSummary",
            vec![Row::new().with("Resource", "Packer").with("Utilization", 0.92)],
        )])
    }

    #[tokio::test]
    async fn empty_store_fails_before_the_gateway() {
        let gateway = CannedGateway::new(Ok("{}".into()));
        let pipeline = ReportPipeline::new(&AnalyzerConfig::default(), gateway.clone());
        let err = pipeline.analyze(&SheetStore::default()).await.unwrap_err();
        assert_eq!(err, AnalysisError::NoReadableData);
        assert!(gateway.seen_prompts.lock().is_empty());
    }

    #[tokio::test]
    async fn gateway_errors_pass_through_unchanged() {
        for err in [
            AnalysisError::Configuration("no key".into()),
            AnalysisError::Transport("503".into()),
            AnalysisError::EmptyResponse,
        ] {
            let pipeline =
                ReportPipeline::new(&AnalyzerConfig::default(), CannedGateway::new(Err(err.clone())));
            assert_eq!(pipeline.analyze(&store()).await.unwrap_err(), err);
        }
    }

    #[tokio::test]
    async fn blank_text_is_an_empty_response() {
        let pipeline =
            ReportPipeline::new(&AnalyzerConfig::default(), CannedGateway::new(Ok("  \n".into())));
        assert_eq!(
            pipeline.analyze(&store()).await.unwrap_err(),
            AnalysisError::EmptyResponse
        );
    }

    #[tokio::test]
    async fn prose_response_is_malformed() {
        let pipeline = ReportPipeline::new(
            &AnalyzerConfig::default(),
            CannedGateway::new(Ok("Sorry, I cannot help with that.".into())),
        );
        let err = pipeline.analyze(&store()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedReport { ref path, .. } if path == "$"));
    }

    #[test]
    fn budget_comes_from_config() {
        let config = AnalyzerConfig {
            max_payload_chars: 20,
            ..AnalyzerConfig::default()
        };
        let pipeline = ReportPipeline::new(&config, CannedGateway::new(Ok(String::new())));
        let request = pipeline.prepare(&store()).unwrap();
        assert!(request.payload_truncated);
        assert_eq!(request.payload_chars, 20);
    }
}
