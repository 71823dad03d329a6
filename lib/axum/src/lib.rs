//! OIDC login broker for axum applications.
//!
//! [`Idm`] bundles the broker's services, built once at startup from an
//! [`IdmConfig`]:
//! - [`ClientRegistry`]: one discovered OIDC client per policy
//! - [`StateStore`] and [`CredentialStore`]: typed views over a pluggable
//!   [`Store`]
//! - [`SessionAccessor`]: signed session cookie to stored credential
//! - [`FlowController`]: outbound, callback, reset-password and logout
//! - [`TokenRefreshManager`]: refresh tokens and CRM roles
//!
//! [`Idm::router`] serves the broker's routes, and the [`gate`] module
//! protects the host application's own routes.

pub mod crm;
pub mod error;
pub mod flow;
pub mod gate;
pub mod hooks;
pub mod oidc;
pub mod page;
pub mod refresh;
pub mod registry;
pub mod routes;
pub mod session;
pub mod stores;

#[cfg(test)]
mod testing;

pub use crm::RoleResolver;
pub use error::{FlowError, OidcError, RefreshError, RoleResolutionError};
pub use flow::{AuthorisationError, CallbackParams, FlowController, OutboundRequest};
pub use gate::{GateRejection, OptionalCredentials, RequireCredentials, require_credentials};
pub use hooks::{Hooks, OnError, PreLogout, PreReturnPathRedirect, ResetPasswordConfirmation};
pub use oidc::{PolicyClient, ProviderMetadata};
pub use refresh::{RefreshOutcome, TokenRefreshManager};
pub use registry::ClientRegistry;
pub use session::SessionAccessor;
pub use stores::{CredentialStore, StateStore};

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use idm_identity::{ConfigError, IdmConfig};
use idm_store::{MemoryStore, Store};
use rootcause::Report;
use std::sync::Arc;
use tracing::info;

/// The broker's services, cheap to clone and usable as axum state.
#[derive(Clone)]
pub struct Idm {
    inner: Arc<IdmInner>,
}

struct IdmInner {
    config: Arc<IdmConfig>,
    key: Key,
    registry: Arc<ClientRegistry>,
    states: StateStore,
    session: SessionAccessor,
    flow: FlowController,
    refresher: TokenRefreshManager,
    hooks: Hooks,
}

impl Idm {
    #[must_use]
    pub fn builder(config: IdmConfig) -> IdmBuilder {
        IdmBuilder::new(config)
    }

    #[must_use]
    pub fn config(&self) -> &IdmConfig {
        &self.inner.config
    }

    /// Key signing the session cookie.
    #[must_use]
    pub fn key(&self) -> &Key {
        &self.inner.key
    }

    #[must_use]
    pub fn registry(&self) -> &ClientRegistry {
        &self.inner.registry
    }

    #[must_use]
    pub fn states(&self) -> &StateStore {
        &self.inner.states
    }

    #[must_use]
    pub fn session(&self) -> &SessionAccessor {
        &self.inner.session
    }

    #[must_use]
    pub fn flow(&self) -> &FlowController {
        &self.inner.flow
    }

    #[must_use]
    pub fn refresher(&self) -> &TokenRefreshManager {
        &self.inner.refresher
    }

    #[must_use]
    pub fn hooks(&self) -> &Hooks {
        &self.inner.hooks
    }

    /// Discovers the default policy's client before serving traffic.
    ///
    /// # Errors
    ///
    /// Returns an error if discovery fails.
    pub async fn warm(&self) -> Result<(), Report<OidcError>> {
        self.inner.registry.warm_default().await
    }
}

impl FromRef<Idm> for Key {
    fn from_ref(idm: &Idm) -> Self {
        idm.inner.key.clone()
    }
}

/// Assembles an [`Idm`] from configuration and optional collaborators.
pub struct IdmBuilder {
    config: IdmConfig,
    store: Option<Arc<dyn Store>>,
    role_resolver: Option<Arc<dyn RoleResolver>>,
    hooks: Hooks,
}

impl IdmBuilder {
    #[must_use]
    pub fn new(config: IdmConfig) -> Self {
        Self {
            config,
            store: None,
            role_resolver: None,
            hooks: Hooks::default(),
        }
    }

    /// Backend for attempts and credentials. Defaults to a [`MemoryStore`]
    /// expiring entries after `cache_ttl_secs`.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn role_resolver(mut self, resolver: Arc<dyn RoleResolver>) -> Self {
        self.role_resolver = Some(resolver);
        self
    }

    #[must_use]
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Validates the configuration and wires the services together.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration is invalid.
    pub fn build(self) -> Result<Idm, Report<ConfigError>> {
        self.config.validate()?;
        let config = Arc::new(self.config);
        let key = Key::derive_from(config.cookie_password.as_bytes());

        let registry = ClientRegistry::new(Arc::clone(&config)).map_err(|report| {
            report.context(ConfigError::Invalid {
                field: "http_timeout_ms",
                reason: "cannot build the identity provider HTTP client".to_string(),
            })
        })?;
        let registry = Arc::new(registry);

        let backend = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::with_default_ttl(config.cache_ttl())));
        let states = StateStore::new(
            Arc::clone(&backend),
            &config.cache_segment,
            config.state_ttl(),
        );
        let credentials = CredentialStore::new(backend, &config.cache_segment, config.cache_ttl());
        let session = SessionAccessor::new(&config, key.clone(), credentials);

        let flow = FlowController::new(
            Arc::clone(&config),
            Arc::clone(&registry),
            states.clone(),
            session.clone(),
            self.hooks.clone(),
        );
        let refresher = TokenRefreshManager::new(
            Arc::clone(&config),
            Arc::clone(&registry),
            session.clone(),
            self.role_resolver,
        );

        info!(
            outbound = %config.outbound_path,
            callback = %config.redirect_uri,
            default_policy = ?config.default_policy,
            "idm services ready"
        );
        Ok(Idm {
            inner: Arc::new(IdmInner {
                config,
                key,
                registry,
                states,
                session,
                flow,
                refresher,
                hooks: self.hooks,
            }),
        })
    }
}
