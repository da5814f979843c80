//! Analysis error taxonomy.
//!
//! Every pipeline stage either returns its value or fails with exactly one of
//! these kinds. Nothing downstream sees a partially built input.

/// Coarse error classification used for session state and user messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Decode,
    NoReadableData,
    Configuration,
    Transport,
    EmptyResponse,
    MalformedReport,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decode => write!(f, "decode"),
            Self::NoReadableData => write!(f, "no_readable_data"),
            Self::Configuration => write!(f, "configuration"),
            Self::Transport => write!(f, "transport"),
            Self::EmptyResponse => write!(f, "empty_response"),
            Self::MalformedReport => write!(f, "malformed_report"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Corrupt or unsupported workbook content.
    Decode { file: String, detail: String },
    /// The workbook decoded but contained no sheets.
    NoReadableData,
    /// Missing credential or unusable configuration.
    Configuration(String),
    /// The engine could not be reached or the call failed.
    Transport(String),
    /// The engine answered without any text.
    EmptyResponse,
    /// The engine answered but the output does not fit the report shape.
    MalformedReport { path: String, reason: String },
}

impl AnalysisError {
    pub fn decode(file: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        Self::Decode {
            file: file.into(),
            detail: detail.to_string(),
        }
    }

    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedReport {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode { .. } => ErrorKind::Decode,
            Self::NoReadableData => ErrorKind::NoReadableData,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Transport(_) => ErrorKind::Transport,
            Self::EmptyResponse => ErrorKind::EmptyResponse,
            Self::MalformedReport { .. } => ErrorKind::MalformedReport,
        }
    }

    /// A missing credential will not fix itself on retry; everything else might.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Configuration(_))
    }

    /// Message suitable for showing to the person who uploaded the file.
    pub fn user_message(&self) -> String {
        match self {
            Self::Decode { file, .. } => format!(
                "Could not read '{}'. Check that it is an Excel or OpenDocument workbook and try again.",
                file
            ),
            Self::NoReadableData => {
                "No readable data was found in the file. Upload a workbook with at least one sheet."
                    .to_string()
            }
            Self::Configuration(_) => {
                "The analysis service is not configured (missing API credential). Contact the administrator."
                    .to_string()
            }
            Self::Transport(_) => {
                "The analysis service could not be reached. Please try again.".to_string()
            }
            Self::EmptyResponse => {
                "The analysis service returned no result. Please try again.".to_string()
            }
            Self::MalformedReport { .. } => {
                "The analysis service returned a report that could not be read. Please try again."
                    .to_string()
            }
        }
    }
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decode { file, detail } => write!(f, "failed to decode {}: {}", file, detail),
            Self::NoReadableData => write!(f, "workbook contains no sheets"),
            Self::Configuration(msg) => write!(f, "configuration error: {}", msg),
            Self::Transport(msg) => write!(f, "transport error: {}", msg),
            Self::EmptyResponse => write!(f, "engine returned an empty response"),
            Self::MalformedReport { path, reason } => {
                write!(f, "malformed report at `{}`: {}", path, reason)
            }
        }
    }
}

impl std::error::Error for AnalysisError {}

pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_is_the_only_fatal_kind() {
        assert!(!AnalysisError::Configuration("no key".into()).is_retryable());
        assert!(AnalysisError::Transport("timeout".into()).is_retryable());
        assert!(AnalysisError::EmptyResponse.is_retryable());
        assert!(AnalysisError::malformed("summary", "missing").is_retryable());
        assert!(AnalysisError::NoReadableData.is_retryable());
    }

    #[test]
    fn malformed_display_carries_path() {
        let err = AnalysisError::malformed("kpis[0].trend", "unknown value \"sideways\"");
        assert_eq!(err.kind(), ErrorKind::MalformedReport);
        assert!(err.to_string().contains("kpis[0].trend"));
    }
}
