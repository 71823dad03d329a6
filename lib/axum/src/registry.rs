//! Process-lifetime cache of per-policy OIDC clients.

use idm_identity::IdmConfig;
use rootcause::Report;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::OidcError;
use crate::oidc::{PolicyClient, ProviderMetadata};

/// Lazily discovers and memoizes one [`PolicyClient`] per policy.
///
/// Lookups take a read lock. Discovery runs without holding any lock, so
/// two concurrent first uses of a policy may both discover; the first
/// client inserted wins and both callers receive it.
#[derive(Debug)]
pub struct ClientRegistry {
    config: Arc<IdmConfig>,
    http: reqwest::Client,
    clients: RwLock<HashMap<Option<String>, Arc<PolicyClient>>>,
}

impl ClientRegistry {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: Arc<IdmConfig>) -> Result<Self, Report<OidcError>> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| OidcError::Configuration {
                reason: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            config,
            http,
            clients: RwLock::default(),
        })
    }

    /// Returns the client for `policy`, falling back to the configured
    /// default policy, discovering it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`OidcError::Discovery`] if the provider metadata cannot be
    /// fetched. Failures are not cached; the next call discovers again.
    pub async fn get_client(
        &self,
        policy: Option<&str>,
    ) -> Result<Arc<PolicyClient>, Report<OidcError>> {
        let key = policy
            .filter(|p| !p.is_empty())
            .or(self.config.default_policy.as_deref())
            .map(str::to_string);

        if let Some(client) = self.clients.read().await.get(&key) {
            return Ok(Arc::clone(client));
        }

        let url = ProviderMetadata::discovery_url(&self.config.identity_app_url, key.as_deref())?;
        let metadata = ProviderMetadata::discover(&self.http, url).await?;
        let client = Arc::new(PolicyClient::new(
            &self.config,
            self.http.clone(),
            key.clone(),
            metadata,
        )?);

        let mut clients = self.clients.write().await;
        let client = Arc::clone(clients.entry(key.clone()).or_insert(client));
        info!(policy = ?key, "registered OIDC client");
        Ok(client)
    }

    /// Discovers the default policy's client ahead of the first request.
    ///
    /// # Errors
    ///
    /// Returns an error if discovery fails.
    pub async fn warm_default(&self) -> Result<(), Report<OidcError>> {
        if self.config.default_policy.is_some() {
            self.get_client(None).await?;
            debug!("default policy client warmed");
        }
        Ok(())
    }

    /// Number of policies with a cached client.
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}
