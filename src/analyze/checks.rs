use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::analyze::cors_checker::CorsChecker;
use crate::analyze::csp_checker::CspPolicyChecker;
use crate::analyze::tls_checker::TlsPolicyChecker;
use crate::analyze::rules::RuleSet;
use crate::error::ConfigError;
use crate::model::{Finding, Headers, Severity};

/// A pluggable header check. Implementations must not touch the network.
pub trait Checker: Send + Sync {
    fn name(&self) -> &str;
    fn check(&self, headers: &Headers) -> anyhow::Result<Vec<Finding>>;
}

pub const BUILTIN_CHECKS: [&str; 6] = [
    "cors",
    "cache-control",
    "cookie-security",
    "information-disclosure",
    "advanced-csp",
    "tls-security",
];

pub fn builtin(name: &str) -> Option<Box<dyn Checker>> {
    match name {
        "cors" => Some(Box::new(CorsChecker)),
        "cache-control" => Some(Box::new(CacheControlChecker)),
        "cookie-security" => Some(Box::new(CookieSecurityChecker)),
        "information-disclosure" => Some(Box::new(DisclosureChecker)),
        "advanced-csp" => Some(Box::new(CspPolicyChecker)),
        "tls-security" => Some(Box::new(TlsPolicyChecker)),
        _ => None,
    }
}

/// Checks run for every response, in registration order.
#[derive(Default)]
pub struct CheckRegistry {
    checks: Vec<Box<dyn Checker>>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, check: Box<dyn Checker>) {
        tracing::debug!(check = check.name(), "registered check");
        self.checks.push(check);
    }

    /// Built-ins selected by name, followed by every `*.toml` rule pack found
    /// in `plugin_dir` (sorted by file name).
    pub fn from_config(enabled: &[String], plugin_dir: Option<&Path>) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for name in enabled {
            let check = builtin(name).ok_or_else(|| ConfigError::UnknownCheck(name.clone()))?;
            registry.register(check);
        }
        if let Some(dir) = plugin_dir {
            for pack in load_rule_packs(dir)? {
                registry.register(Box::new(pack));
            }
        }
        Ok(registry)
    }

    pub fn names(&self) -> Vec<&str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// A failing or panicking check is logged and skipped; the rest still run.
    pub fn run(&self, headers: &Headers) -> Vec<Finding> {
        let mut findings = Vec::new();
        for check in &self.checks {
            match catch_unwind(AssertUnwindSafe(|| check.check(headers))) {
                Ok(Ok(mut found)) => findings.append(&mut found),
                Ok(Err(e)) => tracing::warn!(check = check.name(), error = %e, "check failed"),
                Err(_) => tracing::warn!(check = check.name(), "check panicked"),
            }
        }
        findings
    }
}

impl std::fmt::Debug for CheckRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

fn load_rule_packs(dir: &Path) -> Result<Vec<RuleSet>, ConfigError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let rd = std::fs::read_dir(dir).map_err(|source| ConfigError::Io {
        path: dir.display().to_string(),
        source,
    })?;
    let mut paths: Vec<_> = rd
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().map(|e| e == "toml").unwrap_or(false))
        .collect();
    paths.sort();
    paths.iter().map(|p| RuleSet::load(p)).collect()
}

impl Checker for RuleSet {
    fn name(&self) -> &str {
        RuleSet::name(self)
    }

    fn check(&self, headers: &Headers) -> anyhow::Result<Vec<Finding>> {
        Ok(self.evaluate(headers))
    }
}

#[derive(Debug, Default)]
pub struct CacheControlChecker;

impl Checker for CacheControlChecker {
    fn name(&self) -> &str {
        "cache-control"
    }

    fn check(&self, headers: &Headers) -> anyhow::Result<Vec<Finding>> {
        let Some(value) = headers.get("cache-control") else {
            return Ok(vec![Finding::new(
                "cache-control",
                "Cache-Control header is missing",
                Severity::Info,
                "Add Cache-Control for sensitive pages: Cache-Control: no-store, no-cache",
            )]);
        };

        let value = value.to_ascii_lowercase();
        let mut findings = Vec::new();
        if value.contains("public") {
            findings.push(Finding::new(
                "cache-control",
                "Cache-Control allows public caching which may expose sensitive data",
                Severity::Warning,
                "Use private or no-store for sensitive pages",
            ));
        }
        if !value.contains("no-store") && !value.contains("no-cache") {
            findings.push(Finding::new(
                "cache-control",
                "Cache-Control does not prevent caching of potentially sensitive data",
                Severity::Info,
                "Add no-store or no-cache directive for sensitive pages",
            ));
        }
        if !headers.contains_key("pragma") {
            findings.push(Finding::new(
                "pragma",
                "Pragma header missing (needed for HTTP/1.0 compatibility)",
                Severity::Info,
                "Add Pragma: no-cache for HTTP/1.0 clients",
            ));
        }
        Ok(findings)
    }
}

static SECURE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i);\s*secure\b").expect("static regex"));
static HTTPONLY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i);\s*httponly\b").expect("static regex"));
static SAMESITE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i);\s*samesite=").expect("static regex"));

/// Set-Cookie attribute checks. Multiple cookies arrive newline separated.
#[derive(Debug, Default)]
pub struct CookieSecurityChecker;

impl Checker for CookieSecurityChecker {
    fn name(&self) -> &str {
        "cookie-security"
    }

    fn check(&self, headers: &Headers) -> anyhow::Result<Vec<Finding>> {
        let Some(raw) = headers.get("set-cookie") else {
            return Ok(Vec::new());
        };

        let mut findings: Vec<Finding> = Vec::new();
        let mut push = |f: Finding| {
            if !findings.contains(&f) {
                findings.push(f);
            }
        };

        for cookie in raw.lines().map(str::trim).filter(|c| !c.is_empty()) {
            if !SECURE_RE.is_match(cookie) {
                push(Finding::new(
                    "set-cookie",
                    "Cookie missing Secure flag",
                    Severity::Warning,
                    "Add Secure flag to cookies: Set-Cookie: name=value; Secure",
                ));
            }
            if !HTTPONLY_RE.is_match(cookie) {
                push(Finding::new(
                    "set-cookie",
                    "Cookie missing HttpOnly flag",
                    Severity::Warning,
                    "Add HttpOnly flag to cookies: Set-Cookie: name=value; HttpOnly",
                ));
            }
            if !SAMESITE_RE.is_match(cookie) {
                push(Finding::new(
                    "set-cookie",
                    "Cookie missing SameSite attribute",
                    Severity::Info,
                    "Add SameSite attribute: Set-Cookie: name=value; SameSite=Strict",
                ));
            }
        }
        Ok(findings)
    }
}

static SERVER_SOFTWARE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(apache|nginx|iis|microsoft|php|python|ruby|express|tomcat|jetty)|/\d").expect("static regex")
});

/// Headers that leak the technology stack.
#[derive(Debug, Default)]
pub struct DisclosureChecker;

impl Checker for DisclosureChecker {
    fn name(&self) -> &str {
        "information-disclosure"
    }

    fn check(&self, headers: &Headers) -> anyhow::Result<Vec<Finding>> {
        let mut findings = Vec::new();

        if let Some(server) = headers.get("server") {
            if SERVER_SOFTWARE_RE.is_match(server) {
                findings.push(Finding::new(
                    "server",
                    format!("Server header discloses software: {}", server),
                    Severity::Info,
                    "Remove or obfuscate the Server header",
                ));
            }
        }
        if let Some(powered) = headers.get("x-powered-by") {
            findings.push(Finding::new(
                "x-powered-by",
                format!("X-Powered-By header discloses technology: {}", powered),
                Severity::Warning,
                "Remove the X-Powered-By header",
            ));
        }
        for name in ["x-aspnet-version", "x-aspnetmvc-version"] {
            if headers.contains_key(name) {
                findings.push(Finding::new(
                    name,
                    format!("{} header discloses the ASP.NET version", name),
                    Severity::Warning,
                    format!("Remove the {} header", name),
                ));
            }
        }
        if let Some(via) = headers.get("via") {
            findings.push(Finding::new(
                "via",
                format!("Via header may disclose proxy information: {}", via),
                Severity::Info,
                "Consider removing or sanitizing the Via header",
            ));
        }
        Ok(findings)
    }
}
