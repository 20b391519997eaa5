use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;

use crate::cli::{CacheAction, Cli, Commands, ExportFormat, PluginAction};
use header_hunter::analyze::certificate::CertificateCheck;
use header_hunter::analyze::security_txt::SecurityTxtCheck;
use header_hunter::analyze::checks::BUILTIN_CHECKS;
use header_hunter::analyze::{AuxiliaryChecks, CheckRegistry, HeaderAnalyzer, RuleSet};
use header_hunter::cache::ResponseCache;
use header_hunter::concurrent::{BatchReport, ScanDispatcher, ScanPipeline};
use header_hunter::config::{Config, Paths};
use header_hunter::http_client::{build_client, ClientOptions};
use header_hunter::output::clean_reporter::{print_detailed, print_result, print_summary};
use header_hunter::output::{write_csv, write_json};
use header_hunter::probe::{BreakerRegistry, HttpFetcher, RateLimiter};
use header_hunter::progress::ProgressTracker;
use header_hunter::target::{dedup_targets, read_target_file, Target};

/// Per-run knobs resolved from config plus CLI overrides.
#[derive(Debug, Clone)]
struct ScanOptions {
    concurrency: usize,
    timeout: Duration,
    rate: Option<String>,
    proxy: Option<String>,
    user_agent: String,
    follow_redirects: bool,
    use_cache: bool,
    cache_ttl: Option<u64>,
    cert_check: bool,
    security_txt: bool,
    show_progress: bool,
}

impl ScanOptions {
    fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.concurrency,
            timeout: Duration::from_secs(config.timeout_secs),
            rate: config.rate.clone(),
            proxy: config.proxy.clone(),
            user_agent: config.user_agent.clone(),
            follow_redirects: config.follow_redirects,
            use_cache: false,
            cache_ttl: None,
            cert_check: true,
            security_txt: false,
            show_progress: true,
        }
    }

    fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: self.timeout,
            user_agent: self.user_agent.clone(),
            follow_redirects: self.follow_redirects,
            proxy: self.proxy.clone(),
        }
    }
}

pub async fn run_from_cli(cli: Cli) -> anyhow::Result<()> {
    // Keep external crates (reqwest/hyper) at INFO to avoid flooding the CLI.
    use tracing_subscriber::EnvFilter;
    let crate_level = if cli.debug { "debug" } else if cli.verbose { "info" } else { "warn" };
    let filter_str = format!(
        "header_hunter={crate},reqwest=info,hyper=info,h2=info",
        crate = crate_level
    );
    let env_filter = EnvFilter::try_new(&filter_str).unwrap_or_else(|_| EnvFilter::new(crate_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(true)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let paths = Paths::discover();
    let config = Config::load(&paths.config_file())?;
    tracing::debug!(root = %paths.root().display(), ?config, "loaded configuration");

    match cli.command {
        Commands::Scan {
            target,
            file,
            concurrency,
            timeout,
            rate,
            proxy,
            user_agent,
            follow_redirects,
            cache,
            cache_ttl,
            no_cert_check,
            security_txt,
            output,
            format,
            no_progress,
            quiet,
        } => {
            let targets = load_targets(&target, file)?;
            let mut opts = ScanOptions::from_config(&config);
            if let Some(c) = concurrency {
                opts.concurrency = c.max(1);
            }
            if let Some(t) = timeout {
                opts.timeout = Duration::from_secs(t);
            }
            if rate.is_some() {
                opts.rate = rate;
            }
            if proxy.is_some() {
                opts.proxy = proxy;
            }
            if let Some(ua) = user_agent {
                opts.user_agent = ua;
            }
            if let Some(follow) = follow_redirects {
                opts.follow_redirects = follow;
            }
            opts.use_cache = cache;
            opts.cache_ttl = cache_ttl;
            opts.cert_check = !no_cert_check;
            opts.security_txt = security_txt;
            opts.show_progress = !no_progress && !quiet;

            let (report, elapsed) = scan(&config, &paths, &opts, targets).await?;
            if !quiet {
                for r in &report.results {
                    print_result(r);
                }
            }
            print_summary(&report, elapsed);

            if let Some(out) = output {
                let path = Path::new(&out);
                match format {
                    ExportFormat::Json => write_json(path, &report.results)?,
                    ExportFormat::Csv => write_csv(path, &report.results)?,
                }
                println!("[=] Results saved to: {}", path.display());
            }
            Ok(())
        }

        Commands::Audit { url, json, output } => {
            let target = Target::parse(&url)?;
            let mut opts = ScanOptions::from_config(&config);
            opts.concurrency = 1;
            opts.security_txt = true;
            opts.show_progress = false;

            let (report, _) = scan(&config, &paths, &opts, vec![target]).await?;
            let Some(result) = report.results.first() else {
                let reason = report
                    .skipped
                    .first()
                    .map(|s| format!("{:?}", s.reason))
                    .unwrap_or_else(|| "no result".to_string());
                anyhow::bail!("audit of {} failed: {}", url, reason);
            };

            if json {
                println!("{}", serde_json::to_string_pretty(result)?);
            } else {
                print_detailed(result);
            }
            if let Some(out) = output {
                write_json(Path::new(&out), std::slice::from_ref(result))?;
                println!("[=] Audit saved to: {}", out);
            }
            Ok(())
        }

        Commands::CiCheck { target, file, threshold, no_fail_on_critical } => {
            let targets = load_targets(&target, file)?;
            let mut opts = ScanOptions::from_config(&config);
            opts.show_progress = false;

            let (report, _) = scan(&config, &paths, &opts, targets).await?;
            let violations = ci_violations(&report, threshold, !no_fail_on_critical);
            if violations.is_empty() {
                println!("[OK] {} target(s) passed (threshold {})", report.results.len(), threshold);
                return Ok(());
            }
            for v in &violations {
                println!("[FAIL] {}", v);
            }
            std::process::exit(1);
        }

        Commands::Cache { action } => {
            let cache = ResponseCache::open(paths.cache_dir(), config.cache)
                .with_context(|| format!("opening cache at {}", paths.cache_dir().display()))?;
            match action {
                CacheAction::Clear => {
                    let n = cache.clear()?;
                    println!("Removed {} cached entries", n);
                }
                CacheAction::ClearExpired => {
                    let n = cache.clear_expired();
                    println!("Removed {} expired entries", n);
                }
            }
            Ok(())
        }

        Commands::Plugin { action: PluginAction::List } => {
            println!("Built-in checks (enable in [checks] enabled):");
            for name in BUILTIN_CHECKS {
                let mark = if config.checks.enabled.iter().any(|e| e == name) { "x" } else { " " };
                println!("   [{}] {}", mark, name);
            }
            let checks = CheckRegistry::from_config(&config.checks.enabled, Some(&paths.plugin_dir()))?;
            println!("Active checks ({}):", checks.len());
            for name in checks.names() {
                println!("   - {}", name);
            }
            let rules = RuleSet::load_optional(&paths.rules_file())?;
            println!("Custom rules: {} ({})", rules.len(), paths.rules_file().display());
            println!("Plugin directory: {}", paths.plugin_dir().display());
            Ok(())
        }
    }
}

fn load_targets(target: &str, from_file: bool) -> anyhow::Result<Vec<Target>> {
    let targets = if from_file {
        read_target_file(Path::new(target))?
    } else {
        vec![Target::parse(target)?]
    };
    let targets = dedup_targets(targets);
    if targets.is_empty() {
        anyhow::bail!("no targets to scan");
    }
    Ok(targets)
}

/// Builds every collaborator up front so configuration errors abort before
/// the first request, then runs the batch. Ctrl-C abandons in-flight work.
async fn scan(
    config: &Config,
    paths: &Paths,
    opts: &ScanOptions,
    targets: Vec<Target>,
) -> anyhow::Result<(BatchReport, Duration)> {
    let limiter = match &opts.rate {
        Some(rate) => Some(Arc::new(RateLimiter::from_rate(rate)?)),
        None => None,
    };

    let rules = RuleSet::load_optional(&paths.rules_file())?;
    let checks = CheckRegistry::from_config(&config.checks.enabled, Some(&paths.plugin_dir()))?;
    let analyzer = Arc::new(HeaderAnalyzer::new(rules, checks));

    let client = build_client(&opts.client_options())?;
    let fetcher = Arc::new(HttpFetcher::new(client, config.retries));

    let mut auxiliary = AuxiliaryChecks::none();
    if opts.cert_check {
        auxiliary.certificate = Some(Box::new(CertificateCheck::new(opts.timeout)));
    }
    if opts.security_txt {
        auxiliary.security_txt = Some(Box::new(SecurityTxtCheck));
    }

    let mut pipeline = ScanPipeline::new(fetcher, analyzer).with_auxiliary(auxiliary);
    if opts.use_cache {
        let mut settings = config.cache;
        if let Some(ttl) = opts.cache_ttl {
            settings.ttl_secs = ttl;
        }
        match ResponseCache::open(paths.cache_dir(), settings) {
            Ok(cache) => pipeline = pipeline.with_cache(cache),
            Err(e) => tracing::warn!(dir = %paths.cache_dir().display(), error = %e, "cache disabled"),
        }
    }

    let breakers = Arc::new(BreakerRegistry::new(config.breaker));
    let mut dispatcher = ScanDispatcher::new(opts.concurrency, breakers, Arc::new(pipeline));
    if let Some(limiter) = limiter {
        dispatcher = dispatcher.with_rate_limiter(limiter);
    }

    tracing::info!(targets = targets.len(), concurrency = opts.concurrency, "starting scan");
    let progress = Arc::new(ProgressTracker::new(targets.len(), !opts.show_progress));
    let started = Instant::now();

    let report = tokio::select! {
        report = dispatcher.run(targets, progress.clone()) => report,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, discarding in-flight scans");
            std::process::exit(130);
        }
    };
    progress.finish();
    Ok((report, started.elapsed()))
}

/// Reasons a CI run should fail. Empty means pass.
fn ci_violations(report: &BatchReport, threshold: u8, fail_on_critical: bool) -> Vec<String> {
    let mut out = Vec::new();
    for r in &report.results {
        if r.score < threshold {
            out.push(format!("{} scored {} (threshold {})", r.url, r.score, threshold));
        }
        if fail_on_critical && r.has_critical() {
            out.push(format!("{} has critical findings", r.url));
        }
    }
    for s in &report.skipped {
        out.push(format!("{} was not scanned: {:?}", s.url, s.reason));
    }
    out
}
