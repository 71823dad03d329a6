//! The state and credential stores.
//!
//! Both are thin typed views over one [`Store`] backend, separated by key
//! namespace under the configured cache segment.

use idm_core::{StateKey, StateToken, SubjectId};
use idm_identity::{AuthenticationAttempt, Credential};
use idm_store::{JsonStore, Lookup, Store, StoreError};
use rootcause::Report;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Pending authentication attempts, keyed by the hash of their state token.
#[derive(Clone)]
pub struct StateStore {
    attempts: JsonStore<AuthenticationAttempt>,
    ttl: Duration,
}

impl StateStore {
    #[must_use]
    pub fn new(backend: Arc<dyn Store>, segment: &str, ttl: Duration) -> Self {
        Self {
            attempts: JsonStore::new(backend, segment, "state"),
            ttl,
        }
    }

    /// Persists `attempt` under the hash of `token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    pub async fn save(
        &self,
        token: &StateToken,
        attempt: &AuthenticationAttempt,
    ) -> Result<StateKey, Report<StoreError>> {
        let key = token.storage_key();
        self.attempts
            .set(key.as_str(), attempt, Some(self.ttl))
            .await?;
        debug!(state_key = %key, policy = %attempt.policy_name, "saved authentication attempt");
        Ok(key)
    }

    /// # Errors
    ///
    /// Returns an error if the backend read fails or the entry is corrupt.
    pub async fn load(
        &self,
        token: &StateToken,
    ) -> Result<Lookup<AuthenticationAttempt>, Report<StoreError>> {
        self.attempts.get(token.storage_key().as_str()).await
    }

    /// Deletes the attempt for `token`, making the state unusable.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend delete fails.
    pub async fn consume(&self, token: &StateToken) -> Result<(), Report<StoreError>> {
        let key = token.storage_key();
        self.attempts.remove(key.as_str()).await?;
        debug!(state_key = %key, "consumed authentication attempt");
        Ok(())
    }
}

/// Stored credentials, keyed by subject.
#[derive(Clone)]
pub struct CredentialStore {
    credentials: JsonStore<Credential>,
    ttl: Duration,
}

impl CredentialStore {
    #[must_use]
    pub fn new(backend: Arc<dyn Store>, segment: &str, ttl: Duration) -> Self {
        Self {
            credentials: JsonStore::new(backend, segment, "credential"),
            ttl,
        }
    }

    /// # Errors
    ///
    /// Returns an error if the backend read fails or the entry is corrupt.
    pub async fn get(&self, subject: &SubjectId) -> Result<Lookup<Credential>, Report<StoreError>> {
        self.credentials.get(subject.as_str()).await
    }

    /// Writes `credential` for `subject`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    pub async fn put(
        &self,
        subject: &SubjectId,
        credential: &Credential,
    ) -> Result<(), Report<StoreError>> {
        self.credentials
            .set(subject.as_str(), credential, Some(self.ttl))
            .await
    }

    /// # Errors
    ///
    /// Returns an error if the backend delete fails.
    pub async fn remove(&self, subject: &SubjectId) -> Result<(), Report<StoreError>> {
        self.credentials.remove(subject.as_str()).await
    }
}
