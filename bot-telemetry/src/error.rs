use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single upstream fetch. Always absorbed into a fetch outcome,
/// never propagated to the UI.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum FetchError {
    #[error("invalid request url: {0}")]
    InvalidUrl(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("upstream responded with HTTP {status}")]
    Status { status: u16 },

    #[error("failed to decode upstream payload: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            Self::Status {
                status: status.as_u16(),
            }
        } else if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

/// Invalid console configuration.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid base url {url}: {reason}")]
    BaseUrl { url: String, reason: String },

    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },

    #[error("poll interval for {0} must be greater than zero")]
    ZeroInterval(String),

    #[error("http timeout must be greater than zero")]
    ZeroTimeout,
}

/// Failure serializing or writing an export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv encoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("export produced non-utf8 output: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("failed to write export: {0}")]
    Io(#[from] std::io::Error),
}
