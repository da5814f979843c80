//! Report Gateway
//!
//! One request, one response, no retries. Retrying belongs to whoever wraps
//! the gateway; the session's answer to a failure is "start over".

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{AnalysisError, AnalysisResult};

use super::request::AnalysisRequest;

#[async_trait]
pub trait ReportGateway: Send + Sync {
    /// Raw engine text for `request`.
    async fn generate(&self, request: &AnalysisRequest) -> AnalysisResult<String>;
}

/// Gemini `generateContent` over REST.
#[derive(Clone)]
pub struct GeminiGateway {
    http: reqwest::Client,
    api_base: String,
    model: String,
    timeout: Duration,
    temperature: f64,
    api_key_vars: Vec<String>,
}

impl GeminiGateway {
    pub fn new(http: reqwest::Client, config: &EngineConfig) -> Self {
        Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            temperature: config.temperature,
            api_key_vars: config.api_key_vars.clone(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> AnalysisResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| AnalysisError::Configuration(format!("http client: {}", e)))?;
        Ok(Self::new(http, config))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Credential lookup happens per call so a missing key is reported as a
    /// configuration problem, never as a transport failure.
    fn api_key(&self) -> AnalysisResult<String> {
        for var in &self.api_key_vars {
            if let Ok(key) = std::env::var(var) {
                if !key.trim().is_empty() {
                    return Ok(key.trim().to_string());
                }
            }
        }
        Err(AnalysisError::Configuration(format!(
            "API key not found (set one of: {})",
            self.api_key_vars.join(", ")
        )))
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }
}

#[async_trait]
impl ReportGateway for GeminiGateway {
    async fn generate(&self, request: &AnalysisRequest) -> AnalysisResult<String> {
        let api_key = self.api_key()?;
        let start = Instant::now();

        let body = GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: request.instruction.clone(),
                }],
            },
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: request.prompt.clone(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: request.schema.clone(),
                temperature: Some(self.temperature),
            },
        };

        debug!(
            request_id = %request.id,
            model = %self.model,
            prompt_chars = request.prompt.len(),
            "sending generateContent"
        );

        let resp = self
            .http
            .post(self.endpoint())
            .timeout(self.timeout)
            .header("x-goog-api-key", api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::Transport(format!("generateContent request: {}", e)))?;

        let status = resp.status();
        let raw = resp
            .text()
            .await
            .map_err(|e| AnalysisError::Transport(format!("generateContent body: {}", e)))?;

        if !status.is_success() {
            let snippet: String = raw.chars().take(800).collect();
            return Err(AnalysisError::Transport(format!(
                "generateContent {}: {}",
                status.as_u16(),
                snippet
            )));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&raw)
            .map_err(|e| AnalysisError::Transport(format!("generateContent json parse: {}", e)))?;

        let latency_ms = start.elapsed().as_millis() as u64;
        match extract_text(&parsed) {
            Some(text) => {
                info!(
                    request_id = %request.id,
                    latency_ms,
                    response_chars = text.len(),
                    "engine responded"
                );
                Ok(text)
            }
            None => {
                warn!(
                    request_id = %request.id,
                    latency_ms,
                    block_reason = parsed
                        .prompt_feedback
                        .as_ref()
                        .and_then(|f| f.block_reason.as_deref())
                        .unwrap_or("none"),
                    finish_reason = parsed
                        .candidates
                        .first()
                        .and_then(|c| c.finish_reason.as_deref())
                        .unwrap_or("none"),
                    "engine returned no text"
                );
                Err(AnalysisError::EmptyResponse)
            }
        }
    }
}

/// Concatenated text parts of the first candidate; `None` when blank.
fn extract_text(resp: &GenerateContentResponse) -> Option<String> {
    let text: String = resp
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect()
        })
        .unwrap_or_default();

    (!text.trim().is_empty()).then_some(text)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    pub system_instruction: Content,
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
struct Part {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    pub response_mime_type: String,
    pub response_schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<CandidatePart>,
}

#[derive(Debug, Clone, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::request::{report_schema, ChartPolicy};
    use uuid::Uuid;

    fn request() -> AnalysisRequest {
        AnalysisRequest {
            id: Uuid::new_v4(),
            instruction: "rules".into(),
            prompt: "data".into(),
            sheet_names_detected: vec!["A".into()],
            selected_sheets: vec!["A".into()],
            payload_chars: 4,
            payload_truncated: false,
            chart_policy: ChartPolicy::LiteralOnly,
            schema: report_schema(ChartPolicy::LiteralOnly),
        }
    }

    #[tokio::test]
    async fn missing_credential_is_a_configuration_error() {
        let config = EngineConfig {
            // Unroutable base: the call must fail before any I/O
            api_base: "http://127.0.0.1:9".into(),
            api_key_vars: vec!["SIMCONSULT_TEST_UNSET_KEY_4F1A".into()],
            ..EngineConfig::default()
        };
        let gateway = GeminiGateway::from_config(&config).unwrap();
        let err = gateway.generate(&request()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Configuration(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn unreachable_engine_is_a_transport_error() {
        std::env::set_var("SIMCONSULT_TEST_KEY_7C2E", "test-key");
        let config = EngineConfig {
            api_base: "http://127.0.0.1:9".into(),
            timeout_secs: 5,
            api_key_vars: vec!["SIMCONSULT_TEST_KEY_7C2E".into()],
            ..EngineConfig::default()
        };
        let gateway = GeminiGateway::from_config(&config).unwrap();
        let err = gateway.generate(&request()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Transport(_)), "got {:?}", err);
        assert!(err.is_retryable());
    }

    #[test]
    fn text_parts_are_concatenated() {
        let resp: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"{\"a\":"},{"text":"1}"}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(&resp).as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn blocked_prompt_has_no_text() {
        let resp: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        assert!(extract_text(&resp).is_none());

        let blank: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"  "}]}}]}"#,
        )
        .unwrap();
        assert!(extract_text(&blank).is_none());
    }

    #[test]
    fn request_body_uses_engine_field_names() {
        let body = GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part { text: "s".into() }],
            },
            contents: vec![],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".into(),
                response_schema: serde_json::json!({"type": "OBJECT"}),
                temperature: None,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(json["generationConfig"]["responseSchema"]["type"], "OBJECT");
        assert!(json["systemInstruction"].get("role").is_none());
    }

    #[test]
    fn endpoint_joins_base_and_model() {
        let config = EngineConfig {
            api_base: "https://example.test/v1beta/".into(),
            model: "m-1".into(),
            ..EngineConfig::default()
        };
        let gateway = GeminiGateway::from_config(&config).unwrap();
        assert_eq!(
            gateway.endpoint(),
            "https://example.test/v1beta/models/m-1:generateContent"
        );
    }
}
