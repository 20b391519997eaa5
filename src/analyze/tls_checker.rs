use crate::analyze::checks::Checker;
use crate::model::{Finding, Headers, Severity};

const HSTS: &str = "strict-transport-security";
const CSP: &str = "content-security-policy";

/// Transport hardening signalled through headers: HSTS coverage and
/// automatic request upgrades.
#[derive(Debug, Default)]
pub struct TlsPolicyChecker;

impl Checker for TlsPolicyChecker {
    fn name(&self) -> &str {
        "tls-security"
    }

    fn check(&self, headers: &Headers) -> anyhow::Result<Vec<Finding>> {
        let mut findings = Vec::new();

        if let Some(hsts) = headers.get(HSTS).map(|v| v.to_ascii_lowercase()) {
            if !hsts.contains("preload") {
                findings.push(Finding::new(
                    HSTS,
                    "HSTS header missing preload directive",
                    Severity::Info,
                    "Add preload: Strict-Transport-Security: max-age=31536000; includeSubDomains; preload",
                ));
            }
            if !hsts.contains("includesubdomains") {
                findings.push(Finding::new(
                    HSTS,
                    "HSTS header missing includeSubDomains directive",
                    Severity::Warning,
                    "Add includeSubDomains: Strict-Transport-Security: max-age=31536000; includeSubDomains",
                ));
            }
        }

        let upgrades = headers
            .get(CSP)
            .map(|v| v.to_ascii_lowercase().contains("upgrade-insecure-requests"))
            .unwrap_or(false);
        if !upgrades {
            findings.push(Finding::new(
                CSP,
                "CSP missing upgrade-insecure-requests directive",
                Severity::Info,
                "Add upgrade-insecure-requests to CSP to automatically upgrade HTTP requests to HTTPS",
            ));
        }

        Ok(findings)
    }
}
