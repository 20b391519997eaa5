use std::path::Path;

use url::Url;

use crate::error::ConfigError;

/// A single URL to scan together with the domain its breaker is keyed on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    url: String,
    domain: String,
}

impl Target {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        let parsed = Url::parse(raw).map_err(|e| ConfigError::InvalidTarget {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        let domain = parsed
            .host_str()
            .ok_or_else(|| ConfigError::InvalidTarget {
                url: raw.to_string(),
                reason: "missing host".to_string(),
            })?
            .to_ascii_lowercase();
        Ok(Self { url: raw.to_string(), domain })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn is_https(&self) -> bool {
        self.url.starts_with("https://")
    }

    /// `scheme://host[:port]` without path, used for well-known lookups.
    pub fn origin(&self) -> String {
        match Url::parse(&self.url) {
            Ok(u) => u.origin().ascii_serialization(),
            Err(_) => self.url.clone(),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}

/// Parse newline-delimited targets. Blank lines and `#` comments are skipped.
pub fn parse_target_list(content: &str) -> Result<Vec<Target>, ConfigError> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(Target::parse)
        .collect()
}

pub fn read_target_file(path: &Path) -> Result<Vec<Target>, ConfigError> {
    let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_target_list(&data)
}

/// Drop repeated URLs, keeping first-seen order.
pub fn dedup_targets(targets: Vec<Target>) -> Vec<Target> {
    let mut seen = std::collections::HashSet::new();
    targets.into_iter().filter(|t| seen.insert(t.url.clone())).collect()
}
