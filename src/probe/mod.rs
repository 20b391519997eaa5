pub mod breaker;
pub mod http_probe;
pub mod throttle;

pub use breaker::{BreakerConfig, BreakerRegistry, CircuitBreaker, CircuitState};
pub use http_probe::{FetchResponse, Fetcher, HttpFetcher};
pub use throttle::{RateLimiter, RateSpec};
