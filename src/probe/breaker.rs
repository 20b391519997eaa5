use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::CircuitOpen;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures that open a closed breaker.
    pub failure_threshold: u32,
    /// How long an open breaker refuses work after the last failure.
    #[serde(rename = "timeout_secs", with = "secs")]
    pub timeout: Duration,
    /// Consecutive half-open successes needed to close again.
    pub half_open_successes: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(60),
            half_open_successes: 3,
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure: Option<Instant>,
    pub half_open_successes: u32,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    half_open_successes: u32,
    in_flight: u32,
}

/// Failure-isolation guard for one domain.
///
/// While closed, calls run concurrently as long as
/// `failure_count + in_flight < failure_threshold`, so even if every admitted
/// call fails the breaker opens after exactly `failure_threshold` of them.
/// Half-open allows one trial call at a time. Callers over the limit wait for
/// a slot and re-check the state when one frees up; an open breaker rejects
/// without waiting.
#[derive(Debug)]
pub struct CircuitBreaker {
    domain: String,
    config: BreakerConfig,
    state: Mutex<BreakerState>,
    released: Notify,
}

/// An admitted call. Dropping it unsettled (cancelled work) frees the slot
/// without recording an outcome.
struct Slot<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl Slot<'_> {
    fn settle(mut self, success: bool) {
        self.settled = true;
        self.breaker.record(success);
    }
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.state.lock().in_flight -= 1;
            self.breaker.released.notify_waiters();
        }
    }
}

impl CircuitBreaker {
    pub fn new(domain: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            domain: domain.into(),
            config,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                half_open_successes: 0,
                in_flight: 0,
            }),
            released: Notify::new(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let s = self.state.lock();
        BreakerSnapshot {
            state: s.state,
            failure_count: s.failure_count,
            last_failure: s.last_failure,
            half_open_successes: s.half_open_successes,
        }
    }

    /// Run `work` under the breaker. The work's own error is always handed back
    /// unchanged; `CircuitOpen` is produced only when the work was not run.
    pub async fn execute<F, Fut, T, E>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CircuitOpen>,
    {
        let slot = self.admit().await?;
        let outcome = work().await;
        slot.settle(outcome.is_ok());
        outcome
    }

    pub fn in_flight(&self) -> u32 {
        self.state.lock().in_flight
    }

    fn open_error(&self) -> CircuitOpen {
        CircuitOpen { domain: self.domain.clone() }
    }

    fn timeout_elapsed(&self, s: &BreakerState) -> bool {
        match s.last_failure {
            Some(at) => Instant::now().saturating_duration_since(at) >= self.config.timeout,
            None => true,
        }
    }

    fn has_room(&self, s: &BreakerState) -> bool {
        match s.state {
            CircuitState::Closed => s.failure_count + s.in_flight < self.config.failure_threshold,
            CircuitState::HalfOpen | CircuitState::Open => s.in_flight == 0,
        }
    }

    async fn admit(&self) -> Result<Slot<'_>, CircuitOpen> {
        loop {
            // Registered before the check so a release in between is not missed.
            let released = self.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            {
                let mut s = self.state.lock();
                if s.state == CircuitState::Open && !self.timeout_elapsed(&s) {
                    return Err(self.open_error());
                }
                if self.has_room(&s) {
                    if s.state == CircuitState::Open {
                        tracing::info!(domain = %self.domain, "circuit half-open, allowing trial request");
                        s.state = CircuitState::HalfOpen;
                        s.half_open_successes = 0;
                    }
                    s.in_flight += 1;
                    return Ok(Slot { breaker: self, settled: false });
                }
            }

            released.await;
        }
    }

    fn record(&self, success: bool) {
        {
            let mut s = self.state.lock();
            s.in_flight -= 1;
            if success {
                self.on_success(&mut s);
            } else {
                self.on_failure(&mut s);
            }
        }
        self.released.notify_waiters();
    }

    fn on_success(&self, s: &mut BreakerState) {
        match s.state {
            CircuitState::HalfOpen => {
                s.half_open_successes += 1;
                if s.half_open_successes >= self.config.half_open_successes {
                    tracing::info!(domain = %self.domain, "circuit closed");
                    s.state = CircuitState::Closed;
                    s.failure_count = 0;
                    s.half_open_successes = 0;
                }
            }
            _ => s.failure_count = 0,
        }
    }

    fn on_failure(&self, s: &mut BreakerState) {
        s.failure_count += 1;
        s.last_failure = Some(Instant::now());
        match s.state {
            CircuitState::HalfOpen => {
                tracing::warn!(domain = %self.domain, "trial request failed, circuit re-opened");
                s.state = CircuitState::Open;
            }
            CircuitState::Closed if s.failure_count >= self.config.failure_threshold => {
                tracing::warn!(domain = %self.domain, failures = s.failure_count, "circuit opened");
                s.state = CircuitState::Open;
            }
            _ => {}
        }
    }
}

/// One breaker per domain, created on first use and kept for the whole run.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self { config, breakers: DashMap::new() }
    }

    pub fn get(&self, domain: &str) -> Arc<CircuitBreaker> {
        if let Some(b) = self.breakers.get(domain) {
            return b.value().clone();
        }
        self.breakers
            .entry(domain.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(domain, self.config)))
            .value()
            .clone()
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Domains whose breaker is currently open.
    pub fn open_domains(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .breakers
            .iter()
            .filter(|e| e.value().state() == CircuitState::Open)
            .map(|e| e.key().clone())
            .collect();
        out.sort();
        out
    }
}
