//! User-defined header rules loaded from TOML.
//!
//! ```toml
//! [[rules]]
//! type = "missing"
//! header = "X-Request-Id"
//! severity = "info"
//! message = "Requests are not traceable"
//!
//! [[rules]]
//! type = "pattern"
//! header = "server"
//! pattern = "nginx/\\d"
//! severity = "warning"
//! message = "Server header exposes nginx version"
//! fix = "Set server_tokens off"
//! ```

use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::model::{Finding, Headers, Severity};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RawRule {
    Missing {
        header: String,
        severity: Severity,
        message: String,
        fix: Option<String>,
    },
    Pattern {
        header: String,
        pattern: String,
        severity: Severity,
        message: String,
        fix: Option<String>,
    },
}

#[derive(Debug, Default, Deserialize)]
struct RuleFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    rules: Vec<RawRule>,
}

#[derive(Debug, Clone)]
pub enum Rule {
    Missing {
        header: String,
        severity: Severity,
        message: String,
        fix: Option<String>,
    },
    Pattern {
        header: String,
        pattern: Regex,
        severity: Severity,
        message: String,
        fix: Option<String>,
    },
}

impl Rule {
    pub fn header(&self) -> &str {
        match self {
            Rule::Missing { header, .. } | Rule::Pattern { header, .. } => header,
        }
    }

    fn compile(raw: RawRule) -> Result<Self, ConfigError> {
        Ok(match raw {
            RawRule::Missing { header, severity, message, fix } => Rule::Missing {
                header: header.to_ascii_lowercase(),
                severity,
                message,
                fix,
            },
            RawRule::Pattern { header, pattern, severity, message, fix } => {
                let compiled = Regex::new(&pattern).map_err(|source| ConfigError::InvalidPattern {
                    header: header.clone(),
                    pattern: pattern.clone(),
                    source,
                })?;
                Rule::Pattern {
                    header: header.to_ascii_lowercase(),
                    pattern: compiled,
                    severity,
                    message,
                    fix,
                }
            }
        })
    }
}

/// An ordered, named list of rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    name: String,
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(name: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self { name: name.into(), rules }
    }

    pub fn parse(name: &str, source: &str, origin: &str) -> Result<Self, ConfigError> {
        let file: RuleFile = toml::from_str(source).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;
        let rules = file
            .rules
            .into_iter()
            .map(Rule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: file.name.unwrap_or_else(|| name.to_string()),
            rules,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "rules".to_string());
        Self::parse(&name, &source, &path.display().to_string())
    }

    /// Missing file means no custom rules.
    pub fn load_optional(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::new("custom", Vec::new()));
        }
        Self::load(path)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn evaluate(&self, headers: &Headers) -> Vec<Finding> {
        self.rules.iter().filter_map(|r| evaluate_rule(r, headers)).collect()
    }
}

pub fn evaluate_rule(rule: &Rule, headers: &Headers) -> Option<Finding> {
    let (header, severity, message, fix) = match rule {
        Rule::Missing { header, severity, message, fix } => {
            if headers.contains_key(header) {
                return None;
            }
            (header, severity, message, fix)
        }
        Rule::Pattern { header, pattern, severity, message, fix } => {
            let value = headers.get(header)?;
            if !pattern.is_match(value) {
                return None;
            }
            (header, severity, message, fix)
        }
    };
    Some(Finding {
        header: header.clone(),
        issue: message.clone(),
        severity: *severity,
        recommended_fix: fix.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &str = r#"
[[rules]]
type = "missing"
header = "X-Request-Id"
severity = "info"
message = "no request id"

[[rules]]
type = "pattern"
header = "Server"
pattern = "nginx/\\d"
severity = "warning"
message = "nginx version exposed"
fix = "server_tokens off"
"#;

    fn headers(pairs: &[(&str, &str)]) -> Headers {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn evaluates_both_rule_kinds_in_order() {
        let set = RuleSet::parse("custom", RULES, "inline").unwrap();
        assert_eq!(set.len(), 2);
        let found = set.evaluate(&headers(&[("server", "nginx/1.25.3")]));
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].header, "x-request-id");
        assert_eq!(found[0].recommended_fix, None);
        assert_eq!(found[1].severity, Severity::Warning);
        assert_eq!(found[1].recommended_fix.as_deref(), Some("server_tokens off"));
    }

    #[test]
    fn pattern_rule_ignores_absent_header() {
        let set = RuleSet::parse("custom", RULES, "inline").unwrap();
        let found = set.evaluate(&headers(&[("x-request-id", "abc")]));
        assert!(found.is_empty());
    }

    #[test]
    fn invalid_regex_is_config_error() {
        let bad = "[[rules]]\ntype = \"pattern\"\nheader = \"a\"\npattern = \"(\"\nseverity = \"info\"\nmessage = \"m\"\n";
        assert!(matches!(
            RuleSet::parse("x", bad, "inline"),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn missing_file_is_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let set = RuleSet::load_optional(&dir.path().join("rules.toml")).unwrap();
        assert!(set.is_empty());
    }
}
