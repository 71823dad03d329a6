//! Refreshing a logged-in user's tokens.

use axum::http::HeaderMap;
use axum_extra::extract::cookie::SignedCookieJar;
use idm_identity::{Credential, IdmConfig};
use idm_store::Lookup;
use rootcause::Report;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::crm::RoleResolver;
use crate::error::RefreshError;
use crate::registry::ClientRegistry;
use crate::session::SessionAccessor;

/// Result of a successful [`TokenRefreshManager::refresh_token`].
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// The provider issued new tokens and they were stored.
    Refreshed(Credential),
    /// The provider rejected a refresh token that a concurrent request had
    /// already rotated; the credential that request stored is returned.
    Superseded(Credential),
}

impl RefreshOutcome {
    #[must_use]
    pub fn credential(&self) -> &Credential {
        match self {
            Self::Refreshed(credential) | Self::Superseded(credential) => credential,
        }
    }

    #[must_use]
    pub fn into_credential(self) -> Credential {
        match self {
            Self::Refreshed(credential) | Self::Superseded(credential) => credential,
        }
    }
}

/// Exchanges stored refresh tokens and re-layers CRM roles.
#[derive(Clone)]
pub struct TokenRefreshManager {
    config: Arc<IdmConfig>,
    registry: Arc<ClientRegistry>,
    session: SessionAccessor,
    roles: Option<Arc<dyn RoleResolver>>,
}

impl TokenRefreshManager {
    #[must_use]
    pub fn new(
        config: Arc<IdmConfig>,
        registry: Arc<ClientRegistry>,
        session: SessionAccessor,
        roles: Option<Arc<dyn RoleResolver>>,
    ) -> Self {
        Self {
            config,
            registry,
            session,
            roles,
        }
    }

    /// Refreshes the credential of the session carrying `headers`.
    ///
    /// The new token is validated like a fresh login, inherits the old
    /// refresh token if the provider did not rotate it, and carries the
    /// contact id forward. When a contact id is known (`contact_id` or the
    /// previous claims) and a [`RoleResolver`] is installed, roles are
    /// resolved again and merged into the new claims.
    ///
    /// Returns the jar to attach to the response along with the outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no session to refresh, the provider
    /// rejects the refresh token, roles cannot be resolved, or the store
    /// fails.
    #[instrument(skip(self, headers))]
    pub async fn refresh_token(
        &self,
        headers: &HeaderMap,
        contact_id: Option<&str>,
    ) -> Result<(SignedCookieJar, RefreshOutcome), Report<RefreshError>> {
        let jar = self.session.jar(headers);
        let current = match self
            .session
            .get_credentials(headers)
            .await
            .map_err(|report| report.context(RefreshError::Store))?
        {
            Lookup::Found(credential) => credential,
            Lookup::NotFound => return Err(RefreshError::NotAuthenticated.into()),
        };
        let refresh_token = current
            .refresh_token()
            .ok_or(RefreshError::MissingRefreshToken)?
            .to_string();

        let policy = current.claims.policy().map(str::to_string);
        let client = self
            .registry
            .get_client(policy.as_deref())
            .await
            .map_err(|report| {
                report.context(RefreshError::ClientUnavailable {
                    policy: policy.clone(),
                })
            })?;

        let mut refreshed = match client.refresh(&refresh_token).await {
            Ok(credential) => credential,
            Err(report) => {
                if let Some(winner) = self.rotated_elsewhere(headers, &refresh_token).await {
                    warn!(
                        policy = ?policy,
                        error = %report,
                        "refresh token was already rotated by a concurrent request"
                    );
                    return Ok((jar, RefreshOutcome::Superseded(winner)));
                }
                return Err(report.context(RefreshError::Rejected));
            }
        };

        if refreshed.token_set.refresh_token.is_none() {
            refreshed.token_set.refresh_token = Some(refresh_token);
        }

        let contact_id = contact_id
            .map(str::to_string)
            .or_else(|| current.claims.contact_id.clone());
        if let Some(contact_id) = contact_id {
            match &self.roles {
                Some(resolver) => {
                    let roles = resolver
                        .resolve_authorization_roles(&self.config.service_id, &contact_id)
                        .await
                        .map_err(|report| {
                            report.context(RefreshError::RoleResolution {
                                contact_id: contact_id.clone(),
                            })
                        })?;
                    refreshed.claims.merge_roles(roles);
                }
                None => {
                    refreshed.claims.roles = current.claims.roles.clone();
                    refreshed.claims.role_mappings = current.claims.role_mappings.clone();
                }
            }
            refreshed.claims.contact_id = Some(contact_id);
        }

        let jar = self
            .session
            .store(jar, &refreshed)
            .await
            .map_err(|report| report.context(RefreshError::Store))?;
        info!(policy = ?policy, "refreshed credential");
        Ok((jar, RefreshOutcome::Refreshed(refreshed)))
    }

    /// The stored credential, if another request has replaced `used` with
    /// a different refresh token since this one read it.
    async fn rotated_elsewhere(&self, headers: &HeaderMap, used: &str) -> Option<Credential> {
        match self.session.get_credentials(headers).await {
            Ok(Lookup::Found(stored)) if stored.refresh_token().is_some_and(|rt| rt != used) => {
                Some(stored)
            }
            Ok(_) => None,
            Err(report) => {
                warn!(error = %report, "could not re-read credential after failed refresh");
                None
            }
        }
    }
}
