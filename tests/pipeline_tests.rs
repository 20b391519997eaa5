use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use header_hunter::analyze::{CheckRegistry, HeaderAnalyzer, RuleSet};
use header_hunter::cache::{CacheSettings, ResponseCache};
use header_hunter::concurrent::SkipReason;
use header_hunter::model::Headers;
use header_hunter::probe::{BreakerConfig, BreakerRegistry, FetchResponse, Fetcher, RateLimiter};
use header_hunter::progress::ProgressTracker;
use header_hunter::{FetchError, ScanDispatcher, ScanPipeline, Severity, Target};

/// Serves canned headers per host and counts calls per URL.
#[derive(Default)]
struct ScriptedFetcher {
    sites: HashMap<String, Headers>,
    calls: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
}

impl ScriptedFetcher {
    fn with_site(mut self, host: &str, pairs: &[(&str, &str)]) -> Self {
        let headers = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        self.sites.insert(host.to_string(), headers);
        self
    }

    fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, target: &Target) -> Result<FetchResponse, FetchError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self.calls.lock().entry(target.url().to_string()).or_default() += 1;
        match self.sites.get(target.domain()) {
            Some(headers) => Ok(FetchResponse {
                status: 200,
                headers: headers.clone(),
                body: Vec::new(),
            }),
            None => Err(FetchError::Other(format!("connection refused: {}", target.domain()))),
        }
    }

    async fn fetch_url(&self, url: &str) -> Result<FetchResponse, FetchError> {
        Err(FetchError::Status { url: url.to_string(), status: 404 })
    }
}

fn targets(urls: &[&str]) -> Vec<Target> {
    urls.iter().map(|u| Target::parse(u).unwrap()).collect()
}

fn dispatcher(fetcher: Arc<ScriptedFetcher>, pipeline_cache: Option<ResponseCache>, breaker: BreakerConfig) -> ScanDispatcher {
    let mut pipeline = ScanPipeline::new(fetcher, Arc::new(HeaderAnalyzer::default()));
    if let Some(cache) = pipeline_cache {
        pipeline = pipeline.with_cache(cache);
    }
    ScanDispatcher::new(2, Arc::new(BreakerRegistry::new(breaker)), Arc::new(pipeline))
}

#[tokio::test]
async fn scores_reflect_served_headers() {
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .with_site("strong.test", &[
                ("Content-Security-Policy", "default-src 'self'"),
                ("Strict-Transport-Security", "max-age=63072000"),
                ("X-Frame-Options", "DENY"),
                ("X-Content-Type-Options", "nosniff"),
                ("Referrer-Policy", "no-referrer"),
            ])
            .with_site("weak.test", &[("Server", "Apache")]),
    );
    let d = dispatcher(fetcher, None, BreakerConfig::default());
    let report = d
        .run(targets(&["https://strong.test/", "https://weak.test/"]), Arc::new(ProgressTracker::hidden(2)))
        .await;

    assert_eq!(report.results.len(), 2);
    let strong = report.results.iter().find(|r| r.url == "https://strong.test/").unwrap();
    let weak = report.results.iter().find(|r| r.url == "https://weak.test/").unwrap();
    // 25 + 25 + 15 + 10 + 10, nothing flagged
    assert_eq!(strong.score, 85);
    assert!(strong.findings.is_empty());
    assert_eq!(weak.score, 0);
    assert!(weak.has_critical());
}

#[tokio::test]
async fn second_run_is_served_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let urls = ["https://a.test/", "https://b.test/", "https://c.test/"];
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .with_site("a.test", &[("X-Frame-Options", "DENY")])
            .with_site("b.test", &[])
            .with_site("c.test", &[("Referrer-Policy", "no-referrer")]),
    );

    let cache = ResponseCache::open(dir.path(), CacheSettings::default()).unwrap();
    let first = dispatcher(fetcher.clone(), Some(cache.clone()), BreakerConfig::default())
        .run(targets(&urls), Arc::new(ProgressTracker::hidden(3)))
        .await;
    assert_eq!(fetcher.total(), 3);
    assert_eq!(cache.len(), 3);

    let second = dispatcher(fetcher.clone(), Some(cache), BreakerConfig::default())
        .run(targets(&urls), Arc::new(ProgressTracker::hidden(3)))
        .await;
    assert_eq!(fetcher.total(), 3, "cached targets must not be fetched again");

    let mut a: Vec<_> = first.results.iter().map(|r| (r.url.clone(), r.score)).collect();
    let mut b: Vec<_> = second.results.iter().map(|r| (r.url.clone(), r.score)).collect();
    a.sort();
    b.sort();
    assert_eq!(a, b);
}

#[tokio::test]
async fn dead_domain_is_isolated_from_healthy_ones() {
    let fetcher = Arc::new(ScriptedFetcher::default().with_site("up.test", &[]));
    let mut urls = vec!["https://up.test/1", "https://up.test/2"];
    let dead: Vec<String> = (0..5).map(|i| format!("https://gone.test/{}", i)).collect();
    urls.extend(dead.iter().map(String::as_str));

    let breaker = BreakerConfig { failure_threshold: 3, ..Default::default() };
    let d = dispatcher(fetcher.clone(), None, breaker);
    let report = d.run(targets(&urls), Arc::new(ProgressTracker::hidden(urls.len()))).await;

    assert_eq!(report.results.len(), 2);
    assert_eq!(report.skipped.len(), 5);
    assert_eq!(report.circuit_open_count(), 2);
    assert!(report.skipped.iter().all(|s| s.domain == "gone.test"));
    let gone_calls: usize = fetcher
        .calls
        .lock()
        .iter()
        .filter(|(url, _)| url.contains("gone.test"))
        .map(|(_, n)| *n)
        .sum();
    assert_eq!(gone_calls, 3);
    assert!(report
        .skipped
        .iter()
        .any(|s| matches!(&s.reason, SkipReason::Failed(msg) if msg.contains("connection refused"))));
}

#[tokio::test(start_paused = true)]
async fn rate_limit_spaces_out_requests() {
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .with_site("a.test", &[])
            .with_site("b.test", &[])
            .with_site("c.test", &[])
            .with_site("d.test", &[]),
    );
    let limiter = Arc::new(RateLimiter::from_rate("2/s").unwrap());
    let d = dispatcher(fetcher, None, BreakerConfig::default()).with_rate_limiter(limiter);

    let start = tokio::time::Instant::now();
    let report = d
        .run(
            targets(&["https://a.test/", "https://b.test/", "https://c.test/", "https://d.test/"]),
            Arc::new(ProgressTracker::hidden(4)),
        )
        .await;

    assert_eq!(report.results.len(), 4);
    // two tokens up front, then at least one 500ms wait
    assert!(start.elapsed() >= Duration::from_millis(500));
}

#[tokio::test]
async fn plugin_rule_packs_add_findings() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("tracing.toml"),
        "name = \"tracing\"\n[[rules]]\ntype = \"missing\"\nheader = \"X-Request-Id\"\nseverity = \"info\"\nmessage = \"Responses carry no request id\"\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let checks = CheckRegistry::from_config(&["information-disclosure".to_string()], Some(dir.path())).unwrap();
    assert_eq!(checks.names(), vec!["information-disclosure", "tracing"]);

    let fetcher = Arc::new(ScriptedFetcher::default().with_site("a.test", &[("X-Powered-By", "PHP/8.2")]));
    let pipeline = ScanPipeline::new(fetcher, Arc::new(HeaderAnalyzer::new(RuleSet::default(), checks)));
    let d = ScanDispatcher::new(1, Arc::new(BreakerRegistry::default()), Arc::new(pipeline));
    let report = d.run(targets(&["https://a.test/"]), Arc::new(ProgressTracker::hidden(1))).await;

    let findings = &report.results[0].findings;
    assert!(findings.iter().any(|f| f.header == "x-powered-by"));
    assert!(findings
        .iter()
        .any(|f| f.header == "x-request-id" && f.severity == Severity::Info));
}
