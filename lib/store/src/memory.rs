//! In-process expiring map.

use async_trait::async_trait;
use rootcause::Report;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::error::StoreError;
use crate::store::Store;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Default [`Store`]: a map held in process memory.
///
/// Entries expire lazily on read and eagerly via [`MemoryStore::purge_expired`].
/// Not shared between processes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    default_ttl: Option<Duration>,
}

impl MemoryStore {
    /// Creates a store whose entries never expire unless a TTL is given on write.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store applying `ttl` to writes that do not specify one.
    #[must_use]
    pub fn with_default_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::default(),
            default_ttl: Some(ttl),
        }
    }

    /// Drops every expired entry, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "purged expired store entries");
        }
        removed
    }

    /// Number of entries currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, Report<StoreError>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<(), Report<StoreError>> {
        let expires_at = ttl.or(self.default_ttl).map(|ttl| Instant::now() + ttl);
        self.entries
            .write()
            .await
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), Report<StoreError>> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn get_returns_none_for_missing_key() {
        let store = MemoryStore::new();
        let value = store.get("missing").await.expect("get should succeed");
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn set_then_get_then_remove() {
        let store = MemoryStore::new();
        store
            .set("k", json!({"a": 1}), None)
            .await
            .expect("set should succeed");
        assert_eq!(
            store.get("k").await.expect("get should succeed"),
            Some(json!({"a": 1}))
        );

        store.remove("k").await.expect("remove should succeed");
        assert!(store.get("k").await.expect("get should succeed").is_none());
    }

    #[tokio::test]
    async fn removing_absent_key_succeeds() {
        let store = MemoryStore::new();
        store.remove("nope").await.expect("remove should succeed");
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let store = MemoryStore::new();
        store
            .set("k", json!(1), Some(Duration::from_secs(10)))
            .await
            .expect("set should succeed");

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(store.get("k").await.expect("get").is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get("k").await.expect("get").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn default_ttl_applies_when_none_given() {
        let store = MemoryStore::with_default_ttl(Duration::from_secs(5));
        store.set("k", json!(1), None).await.expect("set");

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(store.get("k").await.expect("get").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_removes_only_expired_entries() {
        let store = MemoryStore::new();
        store
            .set("short", json!(1), Some(Duration::from_secs(1)))
            .await
            .expect("set");
        store.set("forever", json!(2), None).await.expect("set");

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.len().await, 1);
        assert!(store.get("forever").await.expect("get").is_some());
    }
}
