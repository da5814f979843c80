//! Analyzer Configuration
//!
//! Layered: built-in defaults, then an optional TOML file, then `SIMCONSULT_*`
//! environment variables. The CLI applies its flags last.
//! Credentials are never part of this struct; the gateway reads them at call time.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AnalysisError, AnalysisResult};
use crate::ingest::classifier::SheetVocabulary;
use crate::report::request::ChartPolicy;

/// Conservative proxy for the engine's request-size limit, in characters.
pub const DEFAULT_MAX_PAYLOAD_CHARS: usize = 500_000;

/// Main configuration for one analyzer instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Generative engine connection settings
    pub engine: EngineConfig,

    /// Character ceiling for the serialized sheet payload
    pub max_payload_chars: usize,

    /// Whether chart series may be estimated when no literal values exist
    pub chart_policy: ChartPolicy,

    /// Known simulation-report sheet identifiers
    pub vocabulary: SheetVocabulary,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            max_payload_chars: DEFAULT_MAX_PAYLOAD_CHARS,
            chart_policy: ChartPolicy::LiteralOnly,
            vocabulary: SheetVocabulary::default(),
        }
    }
}

/// Generative engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// REST base, without the trailing `/models/...`
    pub api_base: String,
    /// Model identifier
    pub model: String,
    /// Whole-request timeout
    pub timeout_secs: u64,
    /// Sampling temperature
    pub temperature: f64,
    /// Environment variables checked, in order, for the API credential
    pub api_key_vars: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com/v1beta".into(),
            model: "gemini-2.5-flash".into(),
            timeout_secs: 120,
            temperature: 0.2,
            api_key_vars: vec!["GEMINI_API_KEY".into(), "API_KEY".into()],
        }
    }
}

impl AnalyzerConfig {
    /// Defaults, overlaid with `path` when given, overlaid with the environment.
    pub fn load(path: Option<&Path>) -> AnalysisResult<Self> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> AnalysisResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AnalysisError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&raw)?;
        debug!(path = %path.display(), "loaded analyzer config");
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> AnalysisResult<Self> {
        toml::from_str(raw)
            .map_err(|e| AnalysisError::Configuration(format!("invalid config: {}", e)))
    }

    /// Apply `SIMCONSULT_*` overrides. Unparseable values are ignored with a warning.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("SIMCONSULT_API_BASE") {
            if !v.trim().is_empty() {
                self.engine.api_base = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("SIMCONSULT_MODEL") {
            if !v.trim().is_empty() {
                self.engine.model = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("SIMCONSULT_MAX_PAYLOAD_CHARS") {
            match v.trim().parse() {
                Ok(n) => self.max_payload_chars = n,
                Err(_) => warn!(value = %v, "ignoring SIMCONSULT_MAX_PAYLOAD_CHARS"),
            }
        }
        if let Ok(v) = std::env::var("SIMCONSULT_TIMEOUT_SECS") {
            match v.trim().parse() {
                Ok(n) => self.engine.timeout_secs = n,
                Err(_) => warn!(value = %v, "ignoring SIMCONSULT_TIMEOUT_SECS"),
            }
        }
        if let Ok(v) = std::env::var("SIMCONSULT_TEMPERATURE") {
            match v.trim().parse::<f64>() {
                Ok(t) if t.is_finite() => self.engine.temperature = t,
                _ => warn!(value = %v, "ignoring SIMCONSULT_TEMPERATURE"),
            }
        }
        if let Ok(v) = std::env::var("SIMCONSULT_ALLOW_ESTIMATES") {
            if matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON") {
                self.chart_policy = ChartPolicy::AllowEstimates;
            }
        }
    }

    pub fn validate(&self) -> AnalysisResult<()> {
        if self.max_payload_chars == 0 {
            return Err(AnalysisError::Configuration(
                "max_payload_chars must be greater than zero".into(),
            ));
        }
        if self.engine.model.trim().is_empty() {
            return Err(AnalysisError::Configuration("engine.model is empty".into()));
        }
        if self.engine.timeout_secs == 0 {
            return Err(AnalysisError::Configuration(
                "engine.timeout_secs must be greater than zero".into(),
            ));
        }
        if self.vocabulary.is_empty() {
            return Err(AnalysisError::Configuration("vocabulary has no entries".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::classifier::{MatchRule, SheetRole};
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = AnalyzerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_payload_chars, DEFAULT_MAX_PAYLOAD_CHARS);
        assert_eq!(config.chart_policy, ChartPolicy::LiteralOnly);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = AnalyzerConfig::from_toml_str(
            r#"
            max_payload_chars = 1000
            chart_policy = "allow_estimates"

            [engine]
            model = "gemini-2.5-pro"
            "#,
        )
        .unwrap();
        assert_eq!(config.max_payload_chars, 1000);
        assert_eq!(config.chart_policy, ChartPolicy::AllowEstimates);
        assert_eq!(config.engine.model, "gemini-2.5-pro");
        assert_eq!(config.engine.timeout_secs, 120);
        assert!(!config.vocabulary.is_empty());
    }

    #[test]
    fn vocabulary_can_be_replaced_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [[vocabulary.entries]]
            id = "Resources"
            role = "replication_detail"
            rule = "exact"
            "#
        )
        .unwrap();

        let config = AnalyzerConfig::from_toml_file(file.path()).unwrap();
        let entries = config.vocabulary.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "Resources");
        assert_eq!(entries[0].role, SheetRole::ReplicationDetail);
        assert_eq!(entries[0].rule, MatchRule::Exact);
    }

    #[test]
    fn zero_budget_is_rejected() {
        let config = AnalyzerConfig {
            max_payload_chars: 0,
            ..AnalyzerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AnalysisError::Configuration(_))
        ));
    }

    #[test]
    fn bad_toml_is_a_configuration_error() {
        let err = AnalyzerConfig::from_toml_str("max_payload_chars = \"lots\"").unwrap_err();
        assert!(matches!(err, AnalysisError::Configuration(_)));
    }
}
