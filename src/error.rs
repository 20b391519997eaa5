use thiserror::Error;

/// Setup-time failures. These abort a run before any target is scanned.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid rate format: {0:?} (expected <count>/<s|m|h>)")]
    InvalidRate(String),

    #[error("invalid target {url:?}: {reason}")]
    InvalidTarget { url: String, reason: String },

    #[error("invalid pattern {pattern:?} in rule for {header}: {source}")]
    InvalidPattern {
        header: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("unknown check {0:?}")]
    UnknownCheck(String),

    #[error("{0}")]
    Invalid(String),
}

/// Raised by the fetch collaborator once its own retries are exhausted.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed after {attempts} attempt(s): {source}")]
    Transport {
        url: String,
        attempts: usize,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("{0}")]
    Other(String),
}

/// A breaker refused to run the unit of work.
#[derive(Debug, Clone, Error)]
#[error("circuit breaker open for {domain}")]
pub struct CircuitOpen {
    pub domain: String,
}

/// Per-target failure. Caught at the task boundary, never fatal to a batch.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpen),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl ScanError {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ScanError::CircuitOpen(_))
    }
}
