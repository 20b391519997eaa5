use once_cell::sync::Lazy;
use regex::Regex;

use crate::analyze::auxiliary::AuxiliaryFindings;
use crate::analyze::checks::CheckRegistry;
use crate::analyze::rules::RuleSet;
use crate::model::{normalize_headers, Finding, Headers, ScanResult, Severity};
use crate::scoring::score_headers;

pub const HSTS_MIN_MAX_AGE: u64 = 31_536_000;

pub struct HeaderSpec {
    pub name: &'static str,
    pub required: bool,
    pub severity: Severity,
    pub message: &'static str,
    pub fix: &'static str,
}

pub const SECURITY_HEADERS: [HeaderSpec; 9] = [
    HeaderSpec {
        name: "content-security-policy",
        required: true,
        severity: Severity::Critical,
        message: "Content-Security-Policy header is missing",
        fix: "Add CSP header: Content-Security-Policy: default-src 'self'",
    },
    HeaderSpec {
        name: "strict-transport-security",
        required: true,
        severity: Severity::Critical,
        message: "Strict-Transport-Security (HSTS) header is missing",
        fix: "Add HSTS header: Strict-Transport-Security: max-age=31536000; includeSubDomains",
    },
    HeaderSpec {
        name: "x-frame-options",
        required: true,
        severity: Severity::Warning,
        message: "X-Frame-Options header is missing",
        fix: "Add X-Frame-Options: DENY or SAMEORIGIN",
    },
    HeaderSpec {
        name: "x-content-type-options",
        required: true,
        severity: Severity::Warning,
        message: "X-Content-Type-Options header is missing",
        fix: "Add X-Content-Type-Options: nosniff",
    },
    HeaderSpec {
        name: "referrer-policy",
        required: true,
        severity: Severity::Info,
        message: "Referrer-Policy header is missing",
        fix: "Add Referrer-Policy: strict-origin-when-cross-origin",
    },
    HeaderSpec {
        name: "permissions-policy",
        required: false,
        severity: Severity::Info,
        message: "Permissions-Policy header is missing",
        fix: "Consider adding Permissions-Policy to control browser features",
    },
    HeaderSpec {
        name: "cross-origin-opener-policy",
        required: false,
        severity: Severity::Info,
        message: "Cross-Origin-Opener-Policy header is missing",
        fix: "Add Cross-Origin-Opener-Policy: same-origin",
    },
    HeaderSpec {
        name: "cross-origin-embedder-policy",
        required: false,
        severity: Severity::Info,
        message: "Cross-Origin-Embedder-Policy header is missing",
        fix: "Add Cross-Origin-Embedder-Policy: require-corp",
    },
    HeaderSpec {
        name: "cross-origin-resource-policy",
        required: false,
        severity: Severity::Info,
        message: "Cross-Origin-Resource-Policy header is missing",
        fix: "Add Cross-Origin-Resource-Policy: same-origin",
    },
];

static MAX_AGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"max-age=(\d+)").expect("static regex"));

pub fn missing_required(headers: &Headers) -> Vec<Finding> {
    SECURITY_HEADERS
        .iter()
        .filter(|spec| spec.required && !headers.contains_key(spec.name))
        .map(|spec| Finding::new(spec.name, spec.message, spec.severity, spec.fix))
        .collect()
}

pub fn validate_values(headers: &Headers) -> Vec<Finding> {
    let mut findings = Vec::new();

    if let Some(csp) = headers.get("content-security-policy") {
        if csp.contains("unsafe-inline") || csp.contains("unsafe-eval") {
            findings.push(Finding::new(
                "content-security-policy",
                "CSP contains unsafe directives (unsafe-inline or unsafe-eval)",
                Severity::Warning,
                "Remove unsafe-inline and unsafe-eval, use nonces or hashes",
            ));
        }
    }

    if let Some(hsts) = headers.get("strict-transport-security") {
        let max_age = MAX_AGE_RE
            .captures(hsts)
            .and_then(|c| c[1].parse::<u64>().ok());
        if matches!(max_age, Some(age) if age < HSTS_MIN_MAX_AGE) {
            findings.push(Finding::new(
                "strict-transport-security",
                "HSTS max-age is less than 1 year (31536000 seconds)",
                Severity::Warning,
                "Set max-age to at least 31536000",
            ));
        }
    }

    if let Some(xfo) = headers.get("x-frame-options") {
        let first = xfo.split_whitespace().next().unwrap_or("").to_ascii_uppercase();
        if first != "DENY" && first != "SAMEORIGIN" {
            findings.push(Finding::new(
                "x-frame-options",
                "X-Frame-Options has invalid value",
                Severity::Warning,
                "Use DENY or SAMEORIGIN",
            ));
        }
    }

    if let Some(xcto) = headers.get("x-content-type-options") {
        if !xcto.trim().eq_ignore_ascii_case("nosniff") {
            findings.push(Finding::new(
                "x-content-type-options",
                "X-Content-Type-Options should be \"nosniff\"",
                Severity::Info,
                "Set to nosniff",
            ));
        }
    }

    findings
}

/// Turns response headers plus auxiliary findings into a scored result.
/// Holds no I/O; everything it needs is passed in or loaded at construction.
#[derive(Debug, Default)]
pub struct HeaderAnalyzer {
    rules: RuleSet,
    checks: CheckRegistry,
}

impl HeaderAnalyzer {
    pub fn new(rules: RuleSet, checks: CheckRegistry) -> Self {
        Self { rules, checks }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn checks(&self) -> &CheckRegistry {
        &self.checks
    }

    /// Ordered findings for already-normalized headers.
    pub fn findings(&self, headers: &Headers, auxiliary: AuxiliaryFindings) -> Vec<Finding> {
        let mut findings = missing_required(headers);
        findings.extend(validate_values(headers));
        findings.extend(self.rules.evaluate(headers));
        findings.extend(self.checks.run(headers));
        findings.extend(auxiliary.certificate);
        findings.extend(auxiliary.security_txt);
        findings
    }

    pub fn analyze(&self, url: &str, headers: &Headers, auxiliary: AuxiliaryFindings) -> ScanResult {
        let normalized = normalize_headers(headers);
        let findings = self.findings(&normalized, auxiliary);
        let score = score_headers(&normalized, &findings);
        tracing::debug!(url, findings = findings.len(), score, "analyzed headers");

        ScanResult {
            url: url.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            headers: headers.clone(),
            findings,
            score,
        }
    }
}
