use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cache::CacheSettings;
use crate::error::ConfigError;
use crate::http_client::DEFAULT_USER_AGENT;
use crate::probe::BreakerConfig;

pub const HOME_ENV: &str = "HEADER_HUNTER_HOME";

/// Built-in checkers are opt-in; none run unless named here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChecksConfig {
    pub enabled: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub retries: usize,
    pub follow_redirects: bool,
    pub user_agent: String,
    pub proxy: Option<String>,
    pub rate: Option<String>,
    pub cache: CacheSettings,
    pub breaker: BreakerConfig,
    pub checks: ChecksConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: 10,
            timeout_secs: 10,
            retries: 3,
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: None,
            rate: None,
            cache: CacheSettings::default(),
            breaker: BreakerConfig::default(),
            checks: ChecksConfig::default(),
        }
    }
}

impl Config {
    pub fn parse(source: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(source).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(source) => Self::parse(&source, &path.display().to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.breaker.failure_threshold == 0 || self.breaker.half_open_successes == 0 {
            return Err(ConfigError::Invalid("breaker thresholds must be at least 1".into()));
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid("cache.max_entries must be at least 1".into()));
        }
        if self.cache.eviction_slack >= self.cache.max_entries {
            return Err(ConfigError::Invalid(format!(
                "cache.eviction_slack ({}) must be smaller than cache.max_entries ({})",
                self.cache.eviction_slack, self.cache.max_entries
            )));
        }
        if let Some(rate) = &self.rate {
            rate.parse::<crate::probe::RateSpec>()?;
        }
        Ok(())
    }
}

/// Resolved on-disk locations for config, cache, plugins and rules.
#[derive(Debug, Clone)]
pub struct Paths {
    root: PathBuf,
}

impl Paths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$HEADER_HUNTER_HOME`, else the platform config dir, else `./.header-hunter`.
    pub fn discover() -> Self {
        if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Self::new(home);
        }
        match directories::ProjectDirs::from("", "", "header-hunter") {
            Some(dirs) => Self::new(dirs.config_dir()),
            None => Self::new(".header-hunter"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn plugin_dir(&self) -> PathBuf {
        self.root.join("plugins")
    }

    pub fn rules_file(&self) -> PathBuf {
        self.root.join("rules.toml")
    }
}
