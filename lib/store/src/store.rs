//! The pluggable store contract.

use async_trait::async_trait;
use rootcause::Report;
use serde_json::Value;
use std::time::Duration;

use crate::error::StoreError;

/// Asynchronous key/value store shared by the state and credential stores.
///
/// The default implementation is [`crate::MemoryStore`]. Deployments with
/// several server instances substitute a shared backend so that an
/// attempt started on one instance can complete on another.
#[async_trait]
pub trait Store: Send + Sync {
    /// Reads the value stored at `key`.
    ///
    /// Returns `Ok(None)` when the key is absent or has expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached.
    async fn get(&self, key: &str) -> Result<Option<Value>, Report<StoreError>>;

    /// Writes `value` at `key`, replacing any previous value.
    ///
    /// `ttl` overrides the store's default lifetime for this entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write.
    async fn set(
        &self,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<(), Report<StoreError>>;

    /// Removes `key`. Removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the delete.
    async fn remove(&self, key: &str) -> Result<(), Report<StoreError>>;
}
