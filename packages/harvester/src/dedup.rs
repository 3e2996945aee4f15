//! Durable record of harvested posting identifiers.
//!
//! The store is a JSON object keyed by posting id. Every mutation rewrites
//! the file through a temporary file and a rename, so readers never observe
//! a half-written store and a crash loses at most the in-flight record.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One tracked posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupRecord {
    pub title: String,
    pub url: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Metadata snapshot stored with a posting id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupMeta {
    pub title: String,
    pub url: String,
}

impl DedupMeta {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }
}

/// Summary of the store's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupStats {
    pub total_tracked: usize,
    /// Records seen within the last 24 hours.
    pub recent_24h: usize,
    pub size_bytes: u64,
}

/// File-backed posting-id store.
#[derive(Debug)]
pub struct DedupStore {
    path: PathBuf,
    records: BTreeMap<String, DedupRecord>,
}

impl DedupStore {
    /// Open the store at `path`.
    ///
    /// A missing file yields an empty store. An unreadable or corrupt file is
    /// moved aside to `<path>.corrupt` and the store starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "dedup store is corrupt, starting empty"
                    );
                    set_aside(&path);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "dedup store is unreadable, starting empty"
                );
                BTreeMap::new()
            }
        };

        tracing::debug!(path = %path.display(), tracked = records.len(), "opened dedup store");
        Self { path, records }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn has(&self, posting_id: &str) -> bool {
        !posting_id.is_empty() && self.records.contains_key(posting_id)
    }

    #[must_use]
    pub fn get(&self, posting_id: &str) -> Option<&DedupRecord> {
        self.records.get(posting_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert a posting, or refresh `last_seen` and metadata of a known one.
    pub fn upsert(&mut self, posting_id: &str, meta: DedupMeta) -> Result<()> {
        self.upsert_at(posting_id, meta, Utc::now())
    }

    /// [`upsert`](Self::upsert) with an explicit timestamp.
    pub fn upsert_at(
        &mut self,
        posting_id: &str,
        meta: DedupMeta,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if posting_id.is_empty() {
            return Ok(());
        }

        self.records
            .entry(posting_id.to_string())
            .and_modify(|record| {
                record.title.clone_from(&meta.title);
                record.url.clone_from(&meta.url);
                record.last_seen = now;
            })
            .or_insert_with(|| DedupRecord {
                title: meta.title.clone(),
                url: meta.url.clone(),
                first_seen: now,
                last_seen: now,
            });
        self.flush()
    }

    /// Remove a posting; returns whether it was tracked.
    pub fn remove(&mut self, posting_id: &str) -> Result<bool> {
        if self.records.remove(posting_id).is_none() {
            return Ok(false);
        }
        self.flush()?;
        Ok(true)
    }

    /// Drop every record.
    pub fn clear(&mut self) -> Result<()> {
        self.records.clear();
        self.flush()
    }

    /// Remove records whose `last_seen` is older than `max_age`.
    pub fn evict_older_than(&mut self, max_age: Duration) -> Result<usize> {
        self.evict_older_than_at(max_age, Utc::now())
    }

    /// [`evict_older_than`](Self::evict_older_than) relative to `now`.
    pub fn evict_older_than_at(&mut self, max_age: Duration, now: DateTime<Utc>) -> Result<usize> {
        // A window reaching before the earliest representable time keeps everything
        let Some(cutoff) = now.checked_sub_signed(max_age) else {
            return Ok(0);
        };
        let before = self.records.len();
        self.records.retain(|_, record| record.last_seen >= cutoff);
        let evicted = before - self.records.len();

        if evicted > 0 {
            self.flush()?;
            tracing::info!(evicted, remaining = self.records.len(), "evicted old dedup records");
        }
        Ok(evicted)
    }

    pub fn stats(&self) -> DedupStats {
        self.stats_at(Utc::now())
    }

    pub fn stats_at(&self, now: DateTime<Utc>) -> DedupStats {
        let day_ago = now - Duration::hours(24);
        DedupStats {
            total_tracked: self.records.len(),
            recent_24h: self
                .records
                .values()
                .filter(|r| r.last_seen > day_ago)
                .count(),
            size_bytes: fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0),
        }
    }

    /// Write the whole store atomically.
    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = sibling(&self.path, "tmp");
        let json = serde_json::to_string_pretty(&self.records)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{suffix}"));
    path.with_file_name(name)
}

fn set_aside(path: &Path) {
    let target = sibling(path, "corrupt");
    if let Err(e) = fs::rename(path, &target) {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "could not move corrupt dedup store aside"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, day, 12, 0, 0).unwrap()
    }

    fn meta(id: &str) -> DedupMeta {
        DedupMeta::new(format!("Job {id}"), format!("https://x.test/cls/{id}.html"))
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = DedupStore::open(dir.path().join("db.json"));
        assert!(store.is_empty());
        assert!(!store.has("60000001"));
    }

    #[test]
    fn test_upsert_persists_immediately() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/db.json");

        let mut store = DedupStore::open(&path);
        store.upsert_at("60000001", meta("60000001"), at(1)).unwrap();

        let reopened = DedupStore::open(&path);
        assert!(reopened.has("60000001"));
        assert_eq!(reopened.get("60000001").unwrap().first_seen, at(1));
        assert!(!sibling(&path, "tmp").exists());
    }

    #[test]
    fn test_upsert_refreshes_last_seen() {
        let dir = TempDir::new().unwrap();
        let mut store = DedupStore::open(dir.path().join("db.json"));
        store.upsert_at("60000001", meta("60000001"), at(1)).unwrap();
        store
            .upsert_at("60000001", DedupMeta::new("Renamed", "u"), at(3))
            .unwrap();

        let record = store.get("60000001").unwrap();
        assert_eq!(record.first_seen, at(1));
        assert_eq!(record.last_seen, at(3));
        assert_eq!(record.title, "Renamed");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_empty_id_is_ignored() {
        let dir = TempDir::new().unwrap();
        let mut store = DedupStore::open(dir.path().join("db.json"));
        store.upsert_at("", meta(""), at(1)).unwrap();
        assert!(store.is_empty());
        assert!(!store.has(""));
    }

    #[test]
    fn test_evict_older_than() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        let mut store = DedupStore::open(&path);
        store.upsert_at("old", meta("old"), at(1)).unwrap();
        store.upsert_at("fresh", meta("fresh"), at(9)).unwrap();

        let evicted = store.evict_older_than_at(Duration::days(7), at(10)).unwrap();
        assert_eq!(evicted, 1);
        assert!(!store.has("old"));
        assert!(store.has("fresh"));
        assert!(!DedupStore::open(&path).has("old"));
    }

    #[test]
    fn test_evict_with_unbounded_window_keeps_everything() {
        let dir = TempDir::new().unwrap();
        let mut store = DedupStore::open(dir.path().join("db.json"));
        store.upsert_at("old", meta("old"), at(1)).unwrap();

        let evicted = store.evict_older_than_at(Duration::MAX, at(10)).unwrap();
        assert_eq!(evicted, 0);
        assert!(store.has("old"));
    }

    #[test]
    fn test_corrupt_file_starts_empty_and_is_kept() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        fs::write(&path, "{ not json").unwrap();

        let store = DedupStore::open(&path);
        assert!(store.is_empty());
        assert_eq!(
            fs::read_to_string(sibling(&path, "corrupt")).unwrap(),
            "{ not json"
        );
    }

    #[test]
    fn test_remove_clear_and_stats() {
        let dir = TempDir::new().unwrap();
        let mut store = DedupStore::open(dir.path().join("db.json"));
        store.upsert_at("a", meta("a"), at(1)).unwrap();
        store.upsert_at("b", meta("b"), at(9)).unwrap();

        let stats = store.stats_at(at(10));
        assert_eq!(stats.total_tracked, 2);
        assert_eq!(stats.recent_24h, 1);
        assert!(stats.size_bytes > 0);

        assert!(store.remove("a").unwrap());
        assert!(!store.remove("a").unwrap());
        store.clear().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_file_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        let mut store = DedupStore::open(&path);
        store.upsert_at("60000001", meta("60000001"), at(1)).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["60000001"]["url"], "https://x.test/cls/60000001.html");
        assert!(json["60000001"]["first_seen"].is_string());
        assert!(json["60000001"]["last_seen"].is_string());
    }
}
