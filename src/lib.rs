pub mod analyze;
pub mod cache;
pub mod concurrent;
pub mod config;
pub mod error;
pub mod http_client;
pub mod model;
pub mod output;
pub mod probe;
pub mod progress;
pub mod scoring;
pub mod target;

// re-export types used by the binary and integration tests
pub use crate::concurrent::{BatchReport, ScanDispatcher, ScanPipeline};
pub use crate::error::{CircuitOpen, ConfigError, FetchError, ScanError};
pub use crate::model::{Finding, ScanResult, Severity};
pub use crate::target::Target;
