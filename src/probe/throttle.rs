use std::str::FromStr;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::error::ConfigError;

static RATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)/([smh])$").expect("static regex"));

/// Parsed `<count>/<s|m|h>` rate string.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSpec {
    pub requests: u32,
    pub period: Duration,
}

impl FromStr for RateSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = RATE_RE
            .captures(s.trim())
            .ok_or_else(|| ConfigError::InvalidRate(s.to_string()))?;
        let requests: u32 = caps[1]
            .parse()
            .map_err(|_| ConfigError::InvalidRate(s.to_string()))?;
        if requests == 0 {
            return Err(ConfigError::InvalidRate(s.to_string()));
        }
        let period = match &caps[2] {
            "s" => Duration::from_secs(1),
            "m" => Duration::from_secs(60),
            _ => Duration::from_secs(3600),
        };
        Ok(Self { requests, period })
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket shared by every worker of a run.
///
/// `acquire` never rejects; an empty bucket only adds latency. When empty the
/// caller waits a flat `period / requests` while holding the bucket, so
/// waiters are served one at a time.
#[derive(Debug)]
pub struct RateLimiter {
    rate: RateSpec,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    pub fn new(rate: RateSpec) -> Self {
        Self {
            rate,
            state: Mutex::new(BucketState {
                tokens: rate.requests as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn from_rate(rate: &str) -> Result<Self, ConfigError> {
        Ok(Self::new(rate.parse()?))
    }

    pub fn capacity(&self) -> u32 {
        self.rate.requests
    }

    /// Time a caller waits when the bucket is empty.
    pub fn wait_interval(&self) -> Duration {
        self.rate.period / self.rate.requests
    }

    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;
        self.refill(&mut state);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return;
        }

        let wait = self.wait_interval();
        tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limit reached, waiting");
        sleep(wait).await;
        self.refill(&mut state);
        state.tokens = (state.tokens - 1.0).max(0.0);
    }

    /// Tokens currently available, after refilling.
    pub async fn available(&self) -> f64 {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        state.tokens
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        let capacity = self.rate.requests as f64;
        let added = elapsed / self.rate.period.as_secs_f64() * capacity;
        state.tokens = (state.tokens + added).min(capacity);
        state.last_refill = now;
    }
}
