use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Response headers keyed by lower-cased name.
pub type Headers = BTreeMap<String, String>;

/// Lower-case every header name. Values are kept as received.
pub fn normalize_headers<'a, I>(headers: I) -> Headers
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    headers
        .into_iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
        .collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    pub fn label(&self) -> &str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
        }
    }

    pub fn color_code(&self) -> &str {
        match self {
            Severity::Critical => "\x1b[1;91m", // Bright Red
            Severity::Warning => "\x1b[1;93m",  // Yellow
            Severity::Info => "\x1b[1;94m",     // Blue
        }
    }

    pub fn reset_color() -> &'static str {
        "\x1b[0m"
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Finding {
    pub header: String,
    pub issue: String,
    pub severity: Severity,
    pub recommended_fix: Option<String>,
}

impl Finding {
    pub fn new(header: &str, issue: impl Into<String>, severity: Severity, fix: impl Into<String>) -> Self {
        Self {
            header: header.to_string(),
            issue: issue.into(),
            severity,
            recommended_fix: Some(fix.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanResult {
    pub url: String,
    /// RFC 3339 / ISO-8601 timestamp of the analysis.
    pub timestamp: String,
    pub headers: Headers,
    pub findings: Vec<Finding>,
    pub score: u8,
}

impl ScanResult {
    pub fn has_critical(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Critical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_serializes_lowercase() {
        let f = Finding::new("x-frame-options", "missing", Severity::Warning, "add it");
        let v = serde_json::to_value(&f).unwrap();
        assert_eq!(v["severity"], "warning");
        assert_eq!(v["recommended_fix"], "add it");
    }

    #[test]
    fn normalize_lowercases_names_only() {
        let mut raw = std::collections::HashMap::new();
        raw.insert("X-Frame-Options".to_string(), "DENY".to_string());
        let h = normalize_headers(&raw);
        assert_eq!(h.get("x-frame-options").map(String::as_str), Some("DENY"));
    }
}
