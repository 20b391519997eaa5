use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::analyze::{AuxiliaryChecks, HeaderAnalyzer};
use crate::cache::ResponseCache;
use crate::error::ScanError;
use crate::model::ScanResult;
use crate::probe::{BreakerRegistry, Fetcher, RateLimiter};
use crate::progress::ProgressTracker;
use crate::target::Target;

/// Append-only collection shared by every worker.
#[derive(Debug)]
pub struct ResultCollector<T> {
    items: Mutex<Vec<T>>,
}

impl<T> ResultCollector<T> {
    pub fn new() -> Self {
        Self { items: Mutex::new(Vec::new()) }
    }

    pub fn push(&self, item: T) {
        self.items.lock().push(item);
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_inner(self) -> Vec<T> {
        self.items.into_inner()
    }

    fn drain(&self) -> Vec<T> {
        std::mem::take(&mut *self.items.lock())
    }
}

impl<T> Default for ResultCollector<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    CircuitOpen,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SkippedTarget {
    pub url: String,
    pub domain: String,
    pub reason: SkipReason,
}

/// Outcome of a batch. `results` is in completion order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<ScanResult>,
    pub skipped: Vec<SkippedTarget>,
}

impl BatchReport {
    pub fn circuit_open_count(&self) -> usize {
        self.skipped.iter().filter(|s| s.reason == SkipReason::CircuitOpen).count()
    }

    pub fn failed_count(&self) -> usize {
        self.skipped.len() - self.circuit_open_count()
    }
}

/// The per-target unit of work: cache lookup, fetch, analyze, cache write.
pub struct ScanPipeline {
    fetcher: Arc<dyn Fetcher>,
    analyzer: Arc<HeaderAnalyzer>,
    auxiliary: AuxiliaryChecks,
    cache: Option<ResponseCache>,
}

impl ScanPipeline {
    pub fn new(fetcher: Arc<dyn Fetcher>, analyzer: Arc<HeaderAnalyzer>) -> Self {
        Self {
            fetcher,
            analyzer,
            auxiliary: AuxiliaryChecks::none(),
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_auxiliary(mut self, auxiliary: AuxiliaryChecks) -> Self {
        self.auxiliary = auxiliary;
        self
    }

    pub async fn scan(&self, target: &Target) -> Result<ScanResult, ScanError> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get::<ScanResult>(target.url()) {
                tracing::info!(url = target.url(), "cache hit");
                return Ok(hit);
            }
        }

        let response = self.fetcher.fetch(target).await?;
        let auxiliary = self.auxiliary.run(target, self.fetcher.as_ref()).await;
        let result = self.analyzer.analyze(target.url(), &response.headers, auxiliary);

        if let Some(cache) = &self.cache {
            cache.set(target.url(), &result);
        }
        Ok(result)
    }
}

impl std::fmt::Debug for ScanPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanPipeline")
            .field("analyzer", &self.analyzer)
            .field("auxiliary", &self.auxiliary)
            .field("cache", &self.cache)
            .finish()
    }
}

/// Bounded worker pool: one task per target, at most `concurrency` in flight.
///
/// Each task takes a rate-limit token, then runs the pipeline through its
/// domain's breaker. Same-domain targets run concurrently while the breaker
/// has room; once pending calls could trip it, further ones wait for a
/// result. Per-target failures become skips; the batch always runs to
/// completion.
#[derive(Debug)]
pub struct ScanDispatcher {
    concurrency: usize,
    limiter: Option<Arc<RateLimiter>>,
    breakers: Arc<BreakerRegistry>,
    pipeline: Arc<ScanPipeline>,
}

impl ScanDispatcher {
    pub fn new(concurrency: usize, breakers: Arc<BreakerRegistry>, pipeline: Arc<ScanPipeline>) -> Self {
        Self {
            concurrency: concurrency.max(1),
            limiter: None,
            breakers,
            pipeline,
        }
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    pub async fn run(&self, targets: Vec<Target>, progress: Arc<ProgressTracker>) -> BatchReport {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let results = Arc::new(ResultCollector::new());
        let skipped = Arc::new(ResultCollector::new());
        let mut futures = FuturesUnordered::new();

        for target in targets {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => break,
            };
            let limiter = self.limiter.clone();
            let breakers = self.breakers.clone();
            let pipeline = self.pipeline.clone();
            let results = results.clone();
            let skipped = skipped.clone();
            let progress = progress.clone();
            let url = target.url().to_string();
            let domain = target.domain().to_string();

            let handle = tokio::spawn(async move {
                if let Some(limiter) = &limiter {
                    limiter.acquire().await;
                }
                let breaker = breakers.get(target.domain());
                match breaker.execute(|| pipeline.scan(&target)).await {
                    Ok(result) => results.push(result),
                    Err(e) => {
                        let reason = if e.is_circuit_open() {
                            tracing::warn!(
                                domain = target.domain(),
                                url = target.url(),
                                reason = "circuit_open",
                                "circuit breaker open, skipping"
                            );
                            SkipReason::CircuitOpen
                        } else {
                            tracing::error!(url = target.url(), error = %e, "failed to scan");
                            SkipReason::Failed(e.to_string())
                        };
                        skipped.push(SkippedTarget {
                            url: target.url().to_string(),
                            domain: target.domain().to_string(),
                            reason,
                        });
                    }
                }
                progress.increment();
                drop(permit);
            });
            futures.push(async move { (url, domain, handle.await) });
        }

        while let Some((url, domain, joined)) = futures.next().await {
            if let Err(e) = joined {
                tracing::error!(url = %url, error = %e, "scan task aborted");
                skipped.push(SkippedTarget {
                    url,
                    domain,
                    reason: SkipReason::Failed(format!("task aborted: {}", e)),
                });
                progress.increment();
            }
        }

        BatchReport {
            results: results.drain(),
            skipped: skipped.drain(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::probe::{BreakerConfig, FetchResponse};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Succeeds for every URL except those containing "down".
    struct StubFetcher {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl StubFetcher {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, target: &Target) -> Result<FetchResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if target.url().contains("down") {
                return Err(FetchError::Status { url: target.url().to_string(), status: 503 });
            }
            let mut headers = crate::model::Headers::new();
            headers.insert("x-frame-options".into(), "DENY".into());
            Ok(FetchResponse { status: 200, headers, body: Vec::new() })
        }

        async fn fetch_url(&self, _url: &str) -> Result<FetchResponse, FetchError> {
            Err(FetchError::Other("unused".into()))
        }
    }

    fn dispatcher(fetcher: Arc<StubFetcher>, concurrency: usize, threshold: u32) -> ScanDispatcher {
        let pipeline = ScanPipeline::new(fetcher, Arc::new(HeaderAnalyzer::default()));
        let breakers = BreakerRegistry::new(BreakerConfig {
            failure_threshold: threshold,
            ..Default::default()
        });
        ScanDispatcher::new(concurrency, Arc::new(breakers), Arc::new(pipeline))
    }

    fn targets(n: usize) -> Vec<Target> {
        (0..n)
            .map(|i| Target::parse(&format!("https://site{}.test/", i)).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn every_target_yields_exactly_one_result() {
        let fetcher = Arc::new(StubFetcher::new());
        let d = dispatcher(fetcher.clone(), 3, 5);
        let progress = Arc::new(ProgressTracker::hidden(20));
        let report = d.run(targets(20), progress.clone()).await;

        assert_eq!(report.results.len(), 20);
        assert!(report.skipped.is_empty());
        let unique: HashSet<_> = report.results.iter().map(|r| r.url.clone()).collect();
        assert_eq!(unique.len(), 20);
        assert_eq!(progress.completed(), 20);
        assert!(fetcher.max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn failing_target_is_skipped_not_fatal() {
        let fetcher = Arc::new(StubFetcher::new());
        let d = dispatcher(fetcher, 4, 5);
        let mut list = targets(5);
        list.push(Target::parse("https://down.test/").unwrap());
        let report = d.run(list, Arc::new(ProgressTracker::hidden(6))).await;

        assert_eq!(report.results.len(), 5);
        assert_eq!(report.skipped.len(), 1);
        assert!(matches!(report.skipped[0].reason, SkipReason::Failed(_)));
    }

    #[tokio::test]
    async fn breaker_stops_fetching_a_dead_domain() {
        let fetcher = Arc::new(StubFetcher::new());
        let d = dispatcher(fetcher.clone(), 4, 3);
        let list: Vec<Target> = (0..6)
            .map(|i| Target::parse(&format!("https://down.test/page{}", i)).unwrap())
            .collect();
        let report = d.run(list, Arc::new(ProgressTracker::hidden(6))).await;

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.failed_count(), 3);
        assert_eq!(report.circuit_open_count(), 3);
        assert_eq!(d.breakers().open_domains(), vec!["down.test".to_string()]);
    }

    #[tokio::test]
    async fn healthy_domain_pages_are_fetched_in_parallel() {
        let fetcher = Arc::new(StubFetcher::new());
        let d = dispatcher(fetcher.clone(), 4, 5);
        let list: Vec<Target> = (0..8)
            .map(|i| Target::parse(&format!("https://one.test/page{}", i)).unwrap())
            .collect();
        let report = d.run(list, Arc::new(ProgressTracker::hidden(8))).await;

        assert_eq!(report.results.len(), 8);
        let peak = fetcher.max_in_flight.load(Ordering::SeqCst);
        assert!(peak > 1 && peak <= 4, "peak {}", peak);
    }
}
