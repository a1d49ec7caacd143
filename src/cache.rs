// src/cache.rs - Memoization of analysis results by computation identity

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, warn};

use crate::errors::Result;
use crate::record::FeatureRecord;

/// Bounded in-memory result cache with least-recently-used eviction.
///
/// `get` never fails: an absent or evicted key is a miss and the caller
/// falls back to recomputation.
///
/// Interior locking lets workers share one cache through an `Arc`; a
/// same-key `put` race resolves to one winning value, never a torn one.
pub struct ResultCache {
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    max_size: usize,
    entries: HashMap<String, CacheSlot>,
    clock: u64,
}

struct CacheSlot {
    value: FeatureRecord,
    last_used: u64,
}

impl ResultCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                max_size: max_size.max(1),
                entries: HashMap::new(),
                clock: 0,
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<FeatureRecord> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.clock += 1;
        let clock = inner.clock;
        let slot = inner.entries.get_mut(key)?;
        slot.last_used = clock;
        Some(slot.value.clone())
    }

    pub fn put(&self, key: &str, value: FeatureRecord) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.clock += 1;
        let clock = inner.clock;

        if !inner.entries.contains_key(key) && inner.entries.len() >= inner.max_size {
            // Evict the least recently used entry before admitting a new one.
            if let Some(victim) = inner
                .entries
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(k, _)| k.clone())
            {
                debug!("cache evicting {}", victim);
                inner.entries.remove(&victim);
            }
        }

        inner.entries.insert(
            key.to_string(),
            CacheSlot {
                value,
                last_used: clock,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Directory-backed persisted cache: one JSON file per key.
///
/// `get` and `put` touch only the file for the requested key; the cache is
/// never loaded wholesale. Read or parse failures are soft: they log and
/// report a miss so the caller recomputes.
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        // Keys may contain path separators; store under a stable hex digest.
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in key.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x100000001b3);
        }
        self.dir.join(format!("{:016x}.json", hash))
    }

    pub fn get(&self, key: &str) -> Option<FeatureRecord> {
        let path = self.entry_path(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(_) => return None,
        };
        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("discarding unreadable cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn put(&self, key: &str, value: &FeatureRecord) {
        let path = self.entry_path(key);
        match serde_json::to_string(value) {
            Ok(content) => {
                if let Err(e) = fs::write(&path, content) {
                    warn!("failed to persist cache entry {}: {}", path.display(), e);
                }
            }
            Err(e) => warn!("failed to serialize cache entry for {}: {}", key, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(area: f64) -> FeatureRecord {
        let mut r = FeatureRecord::new();
        r.insert("area", area);
        r
    }

    #[test]
    fn get_after_put_returns_stored_value() {
        let cache = ResultCache::new(8);
        cache.put("image_1:organoid.spheroid", record(42.0));
        let got = cache.get("image_1:organoid.spheroid").unwrap();
        assert_eq!(got, record(42.0));
    }

    #[test]
    fn get_on_absent_key_is_a_miss_not_an_error() {
        let cache = ResultCache::new(8);
        assert!(cache.get("never_stored").is_none());
    }

    #[test]
    fn capacity_overflow_evicts_least_recently_used() {
        let cache = ResultCache::new(2);
        cache.put("a", record(1.0));
        cache.put("b", record(2.0));
        // Touch "a" so "b" becomes the LRU entry.
        cache.get("a").unwrap();
        cache.put("c", record(3.0));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn same_key_put_replaces_without_eviction() {
        let cache = ResultCache::new(2);
        cache.put("a", record(1.0));
        cache.put("b", record(2.0));
        cache.put("a", record(10.0));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").unwrap(), record(10.0));
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn concurrent_puts_on_distinct_keys_do_not_corrupt() {
        use std::sync::Arc;
        use std::thread;

        let cache = Arc::new(ResultCache::new(64));
        let mut handles = Vec::new();
        for t in 0..4 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for i in 0..10 {
                    let key = format!("worker{}:item{}", t, i);
                    cache.put(&key, record((t * 10 + i) as f64));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 40);
        assert_eq!(cache.get("worker2:item5").unwrap(), record(25.0));
    }

    #[test]
    fn same_key_put_race_resolves_to_one_writer() {
        use std::sync::Arc;
        use std::thread;

        let cache = Arc::new(ResultCache::new(8));
        let mut handles = Vec::new();
        for t in 0..4 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for _ in 0..50 {
                    cache.put("shared", record(t as f64));
                    // Every read must see some writer's complete value.
                    let seen = cache.get("shared").unwrap().get_f64("area").unwrap();
                    assert!(seen >= 0.0 && seen <= 3.0 && seen.fract() == 0.0);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 1);
        let winner = cache.get("shared").unwrap().get_f64("area").unwrap();
        assert!([0.0, 1.0, 2.0, 3.0].contains(&winner));
    }

    #[test]
    fn disk_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path()).unwrap();
        cache.put("series_4/t03.png:organoid.spheroid", &record(7.5));
        let got = cache.get("series_4/t03.png:organoid.spheroid").unwrap();
        assert_eq!(got, record(7.5));
        assert!(cache.get("series_4/t04.png:organoid.spheroid").is_none());
    }

    #[test]
    fn disk_cache_corrupt_entry_degrades_to_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path()).unwrap();
        cache.put("key", &record(1.0));
        // Corrupt the stored file.
        let entry = fs::read_dir(dir.path())
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        fs::write(&entry, "{not json").unwrap();
        assert!(cache.get("key").is_none());
    }
}
