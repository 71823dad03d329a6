//! Typed, namespaced access to a [`Store`].

use rootcause::Report;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crate::error::StoreError;
use crate::lookup::Lookup;
use crate::store::Store;

/// Serializes values of `T` as JSON under `{segment}:{namespace}:{key}`.
///
/// Several `JsonStore`s can share one backend without their keys colliding.
pub struct JsonStore<T> {
    backend: Arc<dyn Store>,
    prefix: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for JsonStore<T> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            prefix: self.prefix.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned,
{
    #[must_use]
    pub fn new(backend: Arc<dyn Store>, segment: &str, namespace: &str) -> Self {
        Self {
            backend,
            prefix: format!("{segment}:{namespace}:"),
            _marker: PhantomData,
        }
    }

    /// Full backend key for `key`.
    #[must_use]
    pub fn key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    /// Reads and decodes the value at `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or the stored value does not
    /// decode as `T`.
    pub async fn get(&self, key: &str) -> Result<Lookup<T>, Report<StoreError>> {
        let full_key = self.key(key);
        let Some(raw) = self.backend.get(&full_key).await? else {
            return Ok(Lookup::NotFound);
        };
        let value = serde_json::from_value(raw).map_err(|e| StoreError::Serialization {
            key: full_key,
            reason: e.to_string(),
        })?;
        Ok(Lookup::Found(value))
    }

    /// Encodes and writes `value` at `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the backend write fails.
    pub async fn set(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), Report<StoreError>> {
        let full_key = self.key(key);
        let raw = serde_json::to_value(value).map_err(|e| StoreError::Serialization {
            key: full_key.clone(),
            reason: e.to_string(),
        })?;
        self.backend.set(&full_key, raw, ttl).await
    }

    /// Removes the value at `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend delete fails.
    pub async fn remove(&self, key: &str) -> Result<(), Report<StoreError>> {
        self.backend.remove(&self.key(key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        name: String,
    }

    fn backend() -> Arc<dyn Store> {
        Arc::new(MemoryStore::new())
    }

    #[tokio::test]
    async fn namespaces_do_not_collide() {
        let backend = backend();
        let a: JsonStore<Record> = JsonStore::new(Arc::clone(&backend), "idm", "state");
        let b: JsonStore<Record> = JsonStore::new(backend, "idm", "credential");

        a.set("k", &Record { name: "a".into() }, None)
            .await
            .expect("set");
        assert_eq!(b.get("k").await.expect("get"), Lookup::NotFound);
        assert_eq!(
            a.get("k").await.expect("get"),
            Lookup::Found(Record { name: "a".into() })
        );
    }

    #[tokio::test]
    async fn undecodable_value_is_an_error_not_a_miss() {
        let backend = backend();
        backend
            .set("idm:state:k", json!({"unexpected": true}), None)
            .await
            .expect("set");
        let store: JsonStore<Record> = JsonStore::new(backend, "idm", "state");

        let err = store.get("k").await.expect_err("decode should fail");
        assert!(matches!(
            err.current_context(),
            StoreError::Serialization { .. }
        ));
    }

    #[tokio::test]
    async fn remove_deletes_value() {
        let store: JsonStore<Record> = JsonStore::new(backend(), "idm", "state");
        store
            .set("k", &Record { name: "x".into() }, None)
            .await
            .expect("set");
        store.remove("k").await.expect("remove");
        assert_eq!(store.get("k").await.expect("get"), Lookup::NotFound);
    }
}
