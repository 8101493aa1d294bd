use thiserror::Error;

/// Why a collaborator could not deliver data. Every variant is non-fatal:
/// the scanner skips the symbol (or degrades a verdict) and moves on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("http status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("empty response")]
    Empty,

    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("operation not supported by {0}")]
    Unsupported(&'static str),
}

impl FetchError {
    /// Short machine-friendly tag used in skip reports and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            FetchError::Transport(_) => "transport",
            FetchError::Status(_) => "http_status",
            FetchError::Malformed(_) => "malformed",
            FetchError::Empty => "empty",
            FetchError::UnknownSymbol(_) => "unknown_symbol",
            FetchError::Unsupported(_) => "unsupported",
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport(_) => true,
            FetchError::Status(code) => crate::exchange::retry::is_retryable_http_error(*code),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => FetchError::Status(status.as_u16()),
            None if err.is_decode() => FetchError::Malformed(err.to_string()),
            None => FetchError::Transport(err.to_string()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("insufficient data: have {have} bars, need {need}")]
    InsufficientData { have: usize, need: usize },

    #[error("malformed bar at index {index}: {reason}")]
    MalformedBars { index: usize, reason: &'static str },
}

impl PipelineError {
    pub fn reason(&self) -> &'static str {
        match self {
            PipelineError::InsufficientData { .. } => "insufficient_data",
            PipelineError::MalformedBars { .. } => "malformed_bars",
        }
    }
}

/// Rejected at startup, never mid-cycle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("unknown timeframe: {0}")]
    UnknownTimeframe(String),

    #[error("unknown exchange: {0}")]
    UnknownExchange(String),

    #[error("unknown universe mode: {0}")]
    UnknownUniverseMode(String),

    #[error("{key}: cannot parse {value:?}")]
    Unparseable { key: &'static str, value: String },

    #[error("{key} = {value} out of range, expected {expected}")]
    OutOfRange {
        key: &'static str,
        value: f64,
        expected: &'static str,
    },

    #[error("{low_key} must be below {high_key}")]
    Inverted {
        low_key: &'static str,
        high_key: &'static str,
    },

    #[error("expected exactly 3 regime timeframes, got {0}")]
    RegimeTimeframeCount(usize),

    #[error("symbol universe is empty")]
    EmptyUniverse,

    #[error("{0} requires CSV_DIR")]
    MissingCsvDir(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(FetchError::Transport("reset".into()).is_retryable());
        assert!(FetchError::Status(429).is_retryable());
        assert!(FetchError::Status(503).is_retryable());
        assert!(!FetchError::Status(400).is_retryable());
        assert!(!FetchError::UnknownSymbol("FOO/USDT".into()).is_retryable());
        assert!(!FetchError::Empty.is_retryable());
    }

    #[test]
    fn reasons_are_stable_tags() {
        assert_eq!(FetchError::Empty.reason(), "empty");
        assert_eq!(
            PipelineError::InsufficientData { have: 10, need: 50 }.reason(),
            "insufficient_data"
        );
    }
}
