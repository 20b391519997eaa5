use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_MAX_ENTRIES: usize = 1000;
pub const DEFAULT_EVICTION_SLACK: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub ttl_secs: u64,
    pub max_entries: usize,
    pub eviction_slack: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL.as_secs(),
            max_entries: DEFAULT_MAX_ENTRIES,
            eviction_slack: DEFAULT_EVICTION_SLACK,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord<V> {
    timestamp: u64,
    value: V,
}

/// SHA-256 of the request identity, hex encoded.
pub fn cache_key(identity: &str) -> String {
    let digest = Sha256::digest(identity.as_bytes());
    format!("{:x}", digest)
}

fn is_entry_name(name: &str) -> bool {
    name.len() == 64 && name.bytes().all(|b| b.is_ascii_hexdigit())
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// File-per-entry response cache.
///
/// Every failure inside the cache is logged and reported as a miss. Writes go
/// to a temporary file in the same directory and are renamed into place.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
    ttl: Duration,
    max_entries: usize,
    eviction_slack: usize,
}

impl ResponseCache {
    pub fn open(dir: impl Into<PathBuf>, settings: CacheSettings) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let max_entries = settings.max_entries.max(1);
        Ok(Self {
            dir,
            ttl: Duration::from_secs(settings.ttl_secs),
            max_entries,
            // Eviction always leaves room for at least the newest entry.
            eviction_slack: settings.eviction_slack.min(max_entries - 1),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn path_for(&self, identity: &str) -> PathBuf {
        self.dir.join(cache_key(identity))
    }

    fn expired(&self, timestamp: u64) -> bool {
        now_secs().saturating_sub(timestamp) > self.ttl.as_secs()
    }

    pub fn get<V: DeserializeOwned>(&self, identity: &str) -> Option<V> {
        let path = self.path_for(identity);
        let data = match fs::read(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cache read error");
                return None;
            }
        };

        match serde_json::from_slice::<CacheRecord<V>>(&data) {
            Ok(record) if self.expired(record.timestamp) => {
                tracing::debug!(key = %identity, "cache entry expired");
                remove_quietly(&path);
                None
            }
            Ok(record) => Some(record.value),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "corrupt cache entry removed");
                remove_quietly(&path);
                None
            }
        }
    }

    pub fn set<V: Serialize>(&self, identity: &str, value: &V) {
        if let Err(e) = self.write_entry(identity, value) {
            tracing::warn!(key = %identity, error = %e, "cache write error");
            return;
        }
        self.enforce_limit(&self.path_for(identity));
    }

    fn write_entry<V: Serialize>(&self, identity: &str, value: &V) -> anyhow::Result<()> {
        let record = CacheRecord { timestamp: now_secs(), value };
        let bytes = serde_json::to_vec(&record)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".tmp-")
            .tempfile_in(&self.dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path_for(identity))?;
        Ok(())
    }

    fn entries(&self) -> Vec<(PathBuf, SystemTime)> {
        let Ok(rd) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        rd.flatten()
            .filter(|e| e.file_name().to_str().map(is_entry_name).unwrap_or(false))
            .filter_map(|e| {
                let modified = e.metadata().and_then(|m| m.modified()).ok()?;
                Some((e.path(), modified))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Once the entry count passes `max_entries`, drop the oldest files until
    /// `eviction_slack` entries of headroom are free again. `keep` is never
    /// evicted.
    fn enforce_limit(&self, keep: &Path) {
        let mut entries = self.entries();
        if entries.len() <= self.max_entries {
            return;
        }
        let target = self.max_entries.saturating_sub(self.eviction_slack).max(1);
        let excess = entries.len().saturating_sub(target);
        entries.retain(|(path, _)| path != keep);
        entries.sort_by_key(|(_, modified)| *modified);
        tracing::debug!(evicting = excess, limit = self.max_entries, "cache over capacity");
        for (path, _) in entries.into_iter().take(excess) {
            remove_quietly(&path);
        }
    }

    /// Delete every entry, including stray temporary files.
    pub fn clear(&self) -> std::io::Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)?.flatten() {
            let path = entry.path();
            if path.is_file() && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Delete entries past their TTL and any that no longer parse.
    pub fn clear_expired(&self) -> usize {
        self.purge_stale(self.entries())
    }

    /// Entries that disappear between listing and reading are skipped.
    fn purge_stale(&self, entries: Vec<(PathBuf, SystemTime)>) -> usize {
        let mut removed = 0;
        for (path, _) in entries {
            let Ok(data) = fs::read(&path) else { continue };
            let stale = match serde_json::from_slice::<CacheRecord<serde_json::Value>>(&data) {
                Ok(record) => self.expired(record.timestamp),
                Err(_) => true,
            };
            if stale {
                remove_quietly(&path);
                removed += 1;
            }
        }
        removed
    }
}

fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::debug!(path = %path.display(), error = %e, "failed to remove cache file"),
    }
}
