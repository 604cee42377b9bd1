//! Error taxonomy shared by validation, aggregation, fetching and the HTTP layer.
//!
//! Every failure the library can report is one variant of [`AnalyzerError`]; callers match
//! on it exhaustively instead of inspecting message strings. An empty comment set is *not*
//! an error here: it is reported as the structured `{"error": "no data"}` summary.

use thiserror::Error;

pub type Result<T, E = AnalyzerError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalyzerError {
    /// Bad aggregation parameter (window size <= 0, percentile outside 0..=100).
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("{field} must be between {min} and {max} (got {value})")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{field} must be a number (got {input:?})")]
    NotANumber { field: String, input: String },

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("no video id found in {0:?}")]
    NoVideoId(String),

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("{field} contains unsafe content")]
    UnsafeText { field: String },

    /// Transport-level failure after the retry budget was spent.
    #[error("network error ({code}): {message}")]
    Network { code: String, message: String },

    /// The upstream API answered, but with an error payload.
    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("config error: {0}")]
    Config(String),
}

impl AnalyzerError {
    pub fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// Stable machine-readable kind, used in API error bodies and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidParameter { .. } => "invalid_parameter",
            Self::OutOfRange { .. } => "out_of_range",
            Self::NotANumber { .. } => "not_a_number",
            Self::InvalidUrl(_) => "invalid_url",
            Self::NoVideoId(_) => "no_video_id",
            Self::InvalidDate(_) => "invalid_date",
            Self::UnsafeText { .. } => "unsafe_text",
            Self::Network { .. } => "network",
            Self::Upstream(_) => "upstream",
            Self::Decode(_) => "decode",
            Self::Config(_) => "config",
        }
    }

    /// True for failures caused by caller input rather than by the environment.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidParameter { .. }
                | Self::OutOfRange { .. }
                | Self::NotANumber { .. }
                | Self::InvalidUrl(_)
                | Self::NoVideoId(_)
                | Self::InvalidDate(_)
                | Self::UnsafeText { .. }
        )
    }
}

impl From<reqwest::Error> for AnalyzerError {
    fn from(e: reqwest::Error) -> Self {
        let code = if e.is_timeout() {
            "TIMEOUT"
        } else if e.is_connect() {
            "NETWORK_ERROR"
        } else if e.is_decode() {
            "DECODE"
        } else {
            "UNKNOWN"
        };
        Self::Network {
            code: code.to_string(),
            message: e.to_string(),
        }
    }
}
