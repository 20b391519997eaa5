use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::analyze::auxiliary::AuxiliaryCheck;
use crate::model::{Finding, Severity};
use crate::probe::Fetcher;
use crate::target::Target;

pub const SECURITY_TXT_PATHS: [&str; 2] = ["/.well-known/security.txt", "/security.txt"];

static CONTACT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?im)^contact:").expect("static regex"));
static EXPIRES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?im)^expires:\s*(.+?)\s*$").expect("static regex"));

/// Field checks for an RFC 9116 security.txt body.
pub fn validate_security_txt(content: &str, now: DateTime<Utc>) -> Vec<Finding> {
    let mut findings = Vec::new();

    if !CONTACT_RE.is_match(content) {
        findings.push(Finding::new(
            "security.txt",
            "Missing required field: Contact",
            Severity::Warning,
            "Add Contact field to security.txt",
        ));
    }

    match EXPIRES_RE.captures(content) {
        None => findings.push(Finding::new(
            "security.txt",
            "Missing recommended field: Expires",
            Severity::Info,
            "Consider adding Expires field to security.txt",
        )),
        Some(caps) => {
            // An unparseable date is not reported.
            if let Ok(expires) = DateTime::parse_from_rfc3339(&caps[1]) {
                if expires.with_timezone(&Utc) < now {
                    findings.push(Finding::new(
                        "security.txt",
                        "security.txt has expired",
                        Severity::Warning,
                        "Update Expires field in security.txt",
                    ));
                }
            }
        }
    }

    findings
}

/// Looks for security.txt on the target's origin.
#[derive(Debug, Clone, Default)]
pub struct SecurityTxtCheck;

#[async_trait]
impl AuxiliaryCheck for SecurityTxtCheck {
    fn name(&self) -> &str {
        "security-txt"
    }

    async fn check(&self, target: &Target, fetcher: &dyn Fetcher) -> Vec<Finding> {
        let origin = target.origin();
        for path in SECURITY_TXT_PATHS {
            let url = format!("{}{}", origin, path);
            match fetcher.fetch_url(&url).await {
                Ok(resp) if resp.is_success() => {
                    tracing::debug!(url = %url, "found security.txt");
                    let body = String::from_utf8_lossy(&resp.body);
                    return validate_security_txt(&body, Utc::now());
                }
                Ok(resp) => tracing::debug!(url = %url, status = resp.status, "no security.txt"),
                Err(e) => tracing::debug!(url = %url, error = %e, "security.txt fetch failed"),
            }
        }
        vec![Finding::new(
            "security.txt",
            "security.txt file not found",
            Severity::Info,
            "Add security.txt file at /.well-known/security.txt",
        )]
    }
}
