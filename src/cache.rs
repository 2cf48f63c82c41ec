//! Info Cache & Read API.
//!
//! A single memoized map, `name -> view`, guarded by a `tokio::sync::RwLock`
//! so concurrent readers don't block each other. There is no TTL —
//! staleness is bounded only by explicit invalidation.

use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

pub struct InfoCache {
    inner: RwLock<HashMap<String, Value>>,
}

impl InfoCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Normal-mode read: returns the cached view, if any.
    pub async fn get(&self, name: &str) -> Option<Value> {
        self.inner.read().await.get(name).cloned()
    }

    /// Populate the cache after a miss. Never called by with-errors reads.
    pub async fn insert(&self, name: String, view: Value) {
        self.inner.write().await.insert(name, view);
    }

    /// Evict a single entry. Called by admission (F) before every write,
    /// and by package removal.
    pub async fn invalidate(&self, name: &str) {
        self.inner.write().await.remove(name);
    }
}

impl Default for InfoCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn miss_then_populate_then_hit() {
        let cache = InfoCache::new();
        assert!(cache.get("foo").await.is_none());
        cache.insert("foo".to_string(), json!({"name": "foo"})).await;
        assert_eq!(cache.get("foo").await.unwrap()["name"], "foo");
    }

    #[tokio::test]
    async fn invalidate_evicts() {
        let cache = InfoCache::new();
        cache.insert("foo".to_string(), json!({})).await;
        cache.invalidate("foo").await;
        assert!(cache.get("foo").await.is_none());
    }
}
