//! Hash cache storage.

use assets_files::Filesystem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

/// A hash taken at a known last-modified time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedHash {
    pub timestamp: DateTime<Utc>,
    pub hash: String,
}

/// Storage for cached hashes.
///
/// The service treats the cache as best-effort: concurrent writers may race on the same key and
/// the last one wins, which is harmless since both computed the same hash.
pub trait HashCache: Send + Sync + fmt::Debug {
    fn get(&self, key: &str) -> Option<CachedHash>;

    fn set(&self, key: &str, value: CachedHash);

    fn remove(&self, key: &str) -> Option<CachedHash>;

    fn clear(&self);
}

/// Cache key for `file_id` stored in `fs`.
pub fn cache_key(fs: &dyn Filesystem, file_id: &str) -> String {
    format!("{}:{}", fs.identity(), file_id)
}

/// Process-local cache backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct InMemoryHashCache {
    entries: RwLock<HashMap<String, CachedHash>>,
}

impl InMemoryHashCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// A poisoned lock only means another thread panicked mid-update; the map itself is still a
// valid cache, so keep serving it.
impl HashCache for InMemoryHashCache {
    fn get(&self, key: &str) -> Option<CachedHash> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: CachedHash) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_owned(), value);
    }

    fn remove(&self, key: &str) -> Option<CachedHash> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key)
    }

    fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_cache_set_get_remove() {
        let cache = InMemoryHashCache::new();
        assert!(cache.is_empty());

        let entry = CachedHash {
            timestamp: Utc::now(),
            hash: "abcdef7890".into(),
        };
        cache.set("public:sam.jpg", entry.clone());
        assert_eq!(cache.get("public:sam.jpg"), Some(entry.clone()));
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.remove("public:sam.jpg"), Some(entry));
        assert!(cache.get("public:sam.jpg").is_none());
    }

    #[test]
    fn test_cached_hash_serialises() {
        let entry = CachedHash {
            timestamp: DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            hash: "abc".into(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["hash"], "abc");
        assert_eq!(json["timestamp"], "2024-01-01T00:00:00Z");

        let back: CachedHash = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }
}
