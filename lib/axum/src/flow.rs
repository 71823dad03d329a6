//! The authentication state machine.
//!
//! An outbound redirect persists an [`AuthenticationAttempt`] under the
//! hash of a fresh state token. The callback looks the attempt up, swaps
//! the code for tokens with the attempt's policy client and either logs
//! the user in, restarts them in the reset-password policy, or sends
//! them to the disallowed page with the provider's error attached.

use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::SignedCookieJar;
use idm_core::StateToken;
use idm_identity::{AuthenticationAttempt, Credential, IdmConfig};
use idm_store::Lookup;
use oauth2::CsrfToken;
use rootcause::Report;
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use url::Url;
use url::form_urlencoded;

use crate::error::{FlowError, OidcError};
use crate::hooks::Hooks;
use crate::oidc::{AuthorizationParams, RESET_PASSWORD_ERROR_ID};
use crate::page::continuation_page;
use crate::registry::ClientRegistry;
use crate::session::SessionAccessor;
use crate::stores::StateStore;

/// Error code attached to the disallowed redirect when a callback's state
/// has no saved attempt.
pub const NO_SAVED_STATE: &str = "no saved state found";

/// Options for starting a login, as accepted by the outbound route.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundRequest {
    pub back_to_path: Option<String>,
    pub policy_name: Option<String>,
    pub journey: Option<String>,
    /// `forceLogin=yes` on the wire.
    #[serde(default, deserialize_with = "yes_flag")]
    pub force_login: bool,
    /// Caller-chosen state; a random one is generated when absent.
    pub state: Option<String>,
    pub nonce: Option<String>,
    /// Space-separated scopes overriding the configured default.
    pub scope: Option<String>,
}

fn yes_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.is_some_and(|v| v.eq_ignore_ascii_case("yes")))
}

/// Parameters the provider posts (or sends in the query) to the callback.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// A provider-reported failure of an authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorisationError {
    pub error: String,
    pub description: Option<String>,
}

impl AuthorisationError {
    /// True when the user chose "forgot password" at the provider.
    #[must_use]
    pub fn is_password_reset_request(&self) -> bool {
        self.description
            .as_deref()
            .is_some_and(|d| d.starts_with(RESET_PASSWORD_ERROR_ID))
    }
}

impl From<&OidcError> for AuthorisationError {
    fn from(err: &OidcError) -> Self {
        match err {
            OidcError::Provider { error, description } => Self {
                error: error.clone(),
                description: description.clone(),
            },
            OidcError::InvalidIdToken { reason } => Self {
                error: "invalid_token".to_string(),
                description: Some(reason.clone()),
            },
            other => Self {
                error: "server_error".to_string(),
                description: Some(other.to_string()),
            },
        }
    }
}

/// Orchestrates outbound redirects, callbacks and logout.
#[derive(Clone)]
pub struct FlowController {
    config: Arc<IdmConfig>,
    registry: Arc<ClientRegistry>,
    states: StateStore,
    session: SessionAccessor,
    hooks: Hooks,
}

impl FlowController {
    #[must_use]
    pub fn new(
        config: Arc<IdmConfig>,
        registry: Arc<ClientRegistry>,
        states: StateStore,
        session: SessionAccessor,
        hooks: Hooks,
    ) -> Self {
        Self {
            config,
            registry,
            states,
            session,
            hooks,
        }
    }

    /// URL of this application's outbound route that starts a login and
    /// returns the user to `back_to_path`.
    ///
    /// The query carries `backToPath`, `policyName`, `journey`,
    /// `forceLogin=yes`, `state`, `nonce` and `scope`, each omitted when it
    /// has no value.
    ///
    /// # Errors
    ///
    /// Returns an error if `app_domain` cannot be parsed.
    pub fn authentication_url(
        &self,
        back_to_path: &str,
        request: &OutboundRequest,
    ) -> Result<Url, Report<FlowError>> {
        let mut url = self
            .config
            .app_url(&self.config.outbound_path)
            .map_err(|report| {
                report.context(FlowError::Configuration {
                    reason: "cannot build outbound URL".to_string(),
                })
            })?;

        let policy = request
            .policy_name
            .as_deref()
            .or(self.config.default_policy.as_deref());
        let journey = request
            .journey
            .as_deref()
            .or(self.config.default_journey.as_deref());

        {
            let mut query = url.query_pairs_mut();
            query.append_pair(
                "backToPath",
                &self.safe_back_to_path(Some(back_to_path)),
            );
            if let Some(policy) = policy {
                query.append_pair("policyName", policy);
            }
            if let Some(journey) = journey {
                query.append_pair("journey", journey);
            }
            if request.force_login {
                query.append_pair("forceLogin", "yes");
            }
            for (name, value) in [
                ("state", &request.state),
                ("nonce", &request.nonce),
                ("scope", &request.scope),
            ] {
                if let Some(value) = value {
                    query.append_pair(name, value);
                }
            }
        }
        Ok(url)
    }

    /// Starts an attempt and returns the provider authorization URL to
    /// redirect the browser to.
    ///
    /// # Errors
    ///
    /// Returns an error if no client is available for the policy or the
    /// attempt cannot be stored.
    #[instrument(skip(self, request), fields(policy = ?request.policy_name))]
    pub async fn outbound_redirect_url(
        &self,
        request: OutboundRequest,
    ) -> Result<Url, Report<FlowError>> {
        self.begin_attempt(request, None).await
    }

    async fn begin_attempt(
        &self,
        request: OutboundRequest,
        policy_pre_password_reset: Option<String>,
    ) -> Result<Url, Report<FlowError>> {
        let policy_name = request
            .policy_name
            .filter(|p| !p.is_empty())
            .or_else(|| self.config.default_policy.clone())
            .ok_or_else(|| FlowError::Configuration {
                reason: "no policy requested and no default_policy configured".to_string(),
            })?;

        let client = self
            .registry
            .get_client(Some(policy_name.as_str()))
            .await
            .map_err(|report| {
                report.context(FlowError::ClientUnavailable {
                    policy: Some(policy_name.clone()),
                })
            })?;

        let token = request
            .state
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| CsrfToken::new_random().secret().clone())
            .parse::<StateToken>()
            .map_err(|e| FlowError::Configuration {
                reason: e.to_string(),
            })?;
        let nonce = request
            .nonce
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| CsrfToken::new_random().secret().clone());

        let attempt = AuthenticationAttempt {
            policy_name,
            journey: request
                .journey
                .filter(|j| !j.is_empty())
                .or_else(|| self.config.default_journey.clone()),
            back_to_path: self.safe_back_to_path(request.back_to_path.as_deref()),
            force_login: request.force_login,
            nonce: Some(nonce),
            policy_pre_password_reset,
        };
        self.states
            .save(&token, &attempt)
            .await
            .map_err(|report| report.context(FlowError::Store))?;

        let mut extra = vec![("policyName", attempt.policy_name.clone())];
        if let Some(journey) = &attempt.journey {
            extra.push(("journey", journey.clone()));
        }
        if !self.config.service_id.is_empty() {
            extra.push(("serviceId", self.config.service_id.clone()));
        }
        let scope = request
            .scope
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.config.default_scope.clone());

        Ok(client.authorization_url(AuthorizationParams {
            state: &token,
            nonce: attempt.nonce.as_deref(),
            scope: &scope,
            force_login: attempt.force_login,
            extra,
        }))
    }

    /// Handles the provider's return to the callback route.
    ///
    /// Unknown, replayed or unreadable state and every provider error end
    /// in a redirect; only store failures after a successful exchange and
    /// an unavailable client are returned as errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt's client cannot be discovered or a
    /// store write fails while completing the login.
    #[instrument(skip_all)]
    pub async fn handle_callback(
        &self,
        headers: &HeaderMap,
        params: CallbackParams,
    ) -> Result<Response, Report<FlowError>> {
        let Some(token) = params
            .state
            .as_deref()
            .and_then(|state| state.parse::<StateToken>().ok())
        else {
            warn!("callback without state");
            return Ok(self.disallowed(NO_SAVED_STATE, Some("callback carried no state")));
        };

        let attempt = match self.states.load(&token).await {
            Ok(Lookup::Found(attempt)) => attempt,
            Ok(Lookup::NotFound) => {
                warn!(state_key = %token.storage_key(), "no saved state for callback");
                return Ok(self.disallowed(NO_SAVED_STATE, None));
            }
            Err(report) => {
                error!(
                    state_key = %token.storage_key(),
                    error = %report,
                    "failed to load saved state"
                );
                return Ok(self.disallowed(NO_SAVED_STATE, Some("state lookup failed")));
            }
        };

        if let Some(error) = params.error {
            let error = AuthorisationError {
                error,
                description: params.error_description,
            };
            return self.handle_authorisation_error(&token, &attempt, error).await;
        }

        let Some(code) = params.code.filter(|c| !c.is_empty()) else {
            let error = AuthorisationError {
                error: "invalid_request".to_string(),
                description: Some("callback carried no authorization code".to_string()),
            };
            return self.handle_authorisation_error(&token, &attempt, error).await;
        };

        let client = self
            .registry
            .get_client(Some(attempt.policy_name.as_str()))
            .await
            .map_err(|report| {
                report.context(FlowError::ClientUnavailable {
                    policy: Some(attempt.policy_name.clone()),
                })
            })?;

        match client.exchange_code(&code, attempt.nonce.as_deref()).await {
            Ok(credential) => {
                self.handle_validated_token(headers, &token, attempt, credential)
                    .await
            }
            Err(report) => {
                warn!(policy = %attempt.policy_name, error = %report, "code exchange failed");
                let error = AuthorisationError::from(report.current_context());
                self.handle_authorisation_error(&token, &attempt, error)
                    .await
            }
        }
    }

    /// Classifies a provider error for `attempt`.
    ///
    /// A "forgot password" error restarts the user in the reset-password
    /// policy, remembering the policy to return to. Anything else goes to
    /// the disallowed page with `error` and `error_description` attached.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset-password attempt cannot be started.
    pub async fn handle_authorisation_error(
        &self,
        token: &StateToken,
        attempt: &AuthenticationAttempt,
        error: AuthorisationError,
    ) -> Result<Response, Report<FlowError>> {
        if let Err(report) = self.states.consume(token).await {
            warn!(error = %report, "failed to drop failed attempt; it will expire");
        }

        if error.is_password_reset_request() {
            info!(policy = %attempt.policy_name, "user requested a password reset");
            let return_policy = attempt
                .policy_pre_password_reset
                .clone()
                .unwrap_or_else(|| attempt.policy_name.clone());
            let url = self
                .begin_attempt(
                    OutboundRequest {
                        back_to_path: Some(attempt.back_to_path.clone()),
                        policy_name: Some(self.config.reset_password_policy.clone()),
                        journey: attempt.journey.clone(),
                        ..OutboundRequest::default()
                    },
                    Some(return_policy),
                )
                .await?;
            return Ok(Redirect::to(url.as_str()).into_response());
        }

        warn!(
            policy = %attempt.policy_name,
            error = %error.error,
            description = ?error.description,
            "authorisation failed"
        );
        Ok(self.disallowed(&error.error, error.description.as_deref()))
    }

    /// Completes a login with a validated credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt cannot be dropped or the credential
    /// cannot be stored.
    pub async fn handle_validated_token(
        &self,
        headers: &HeaderMap,
        token: &StateToken,
        attempt: AuthenticationAttempt,
        credential: Credential,
    ) -> Result<Response, Report<FlowError>> {
        if credential
            .claims
            .issued_by_policy(&self.config.reset_password_policy)
            && let Some(original_policy) = attempt.policy_pre_password_reset.clone()
        {
            return self
                .handle_reset_password_completion(headers, token, &attempt, original_policy)
                .await;
        }

        self.states
            .consume(token)
            .await
            .map_err(|report| report.context(FlowError::Store))?;
        let jar = self
            .session
            .store(self.session.jar(headers), &credential)
            .await?;
        info!(policy = %attempt.policy_name, "login completed");

        if let Some(hook) = &self.hooks.pre_return_path_redirect
            && let Some(response) = hook
                .before_return(headers, &credential, &attempt.back_to_path)
                .await
        {
            return Ok((jar, response).into_response());
        }

        Ok((
            jar,
            continuation_page(
                &attempt.back_to_path,
                &self.config.post_authentication_redirect_js_path,
            ),
        )
            .into_response())
    }

    /// Sends a user who finished the reset-password policy back through
    /// their original policy without logging them in.
    ///
    /// # Errors
    ///
    /// Returns an error if the follow-up attempt cannot be started.
    pub async fn handle_reset_password_completion(
        &self,
        headers: &HeaderMap,
        token: &StateToken,
        attempt: &AuthenticationAttempt,
        original_policy: String,
    ) -> Result<Response, Report<FlowError>> {
        debug!(policy = %original_policy, "password reset completed");
        self.states
            .consume(token)
            .await
            .map_err(|report| report.context(FlowError::Store))?;

        let url = self
            .begin_attempt(
                OutboundRequest {
                    back_to_path: Some(attempt.back_to_path.clone()),
                    policy_name: Some(original_policy),
                    journey: attempt.journey.clone(),
                    force_login: attempt.force_login,
                    ..OutboundRequest::default()
                },
                None,
            )
            .await?;

        if let Some(hook) = &self.hooks.reset_password_confirmation
            && let Some(response) = hook.confirm(headers, &url).await
        {
            return Ok(response);
        }
        Ok(Redirect::to(url.as_str()).into_response())
    }

    /// Ends the session for the request carrying `headers`.
    ///
    /// A pre-logout hook that returns a response takes over entirely.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored credential cannot be removed.
    #[instrument(skip_all)]
    pub async fn logout(
        &self,
        headers: &HeaderMap,
        back_to_path: Option<&str>,
    ) -> Result<Response, Report<FlowError>> {
        if let Some(hook) = &self.hooks.pre_logout
            && let Some(response) = hook.before_logout(headers).await
        {
            return Ok(response);
        }

        let jar: SignedCookieJar = self
            .session
            .clear(self.session.jar(headers))
            .await
            .map_err(|report| report.context(FlowError::Store))?;
        let target = self.safe_back_to_path(back_to_path);
        Ok((jar, Redirect::to(&target)).into_response())
    }

    /// Where to send a request the gate refused.
    ///
    /// # Errors
    ///
    /// Returns an error if the authentication URL cannot be built.
    pub fn denied_redirect(&self, requested: &str) -> Result<String, Report<FlowError>> {
        if self.config.login_on_disallow {
            Ok(self
                .authentication_url(requested, &OutboundRequest::default())?
                .to_string())
        } else {
            Ok(self.disallowed_target(&[("notLoggedInErr", "yes")]))
        }
    }

    /// `back_to_path` if it is a same-origin path, else the configured
    /// default.
    #[must_use]
    pub fn safe_back_to_path(&self, back_to_path: Option<&str>) -> String {
        match back_to_path {
            Some(path)
                if path.starts_with('/')
                    && !path.starts_with("//")
                    && !path.starts_with("/\\")
                    && !path.chars().any(char::is_control) =>
            {
                path.to_string()
            }
            _ => self.config.default_back_to_path.clone(),
        }
    }

    /// Redirect to the disallowed page carrying `error` and
    /// `error_description`.
    pub(crate) fn disallowed(&self, error: &str, description: Option<&str>) -> Response {
        let mut pairs = vec![("error", error)];
        if let Some(description) = description {
            pairs.push(("error_description", description));
        }
        Redirect::to(&self.disallowed_target(&pairs)).into_response()
    }

    /// The disallowed path with `pairs` appended to any query it already has.
    fn disallowed_target(&self, pairs: &[(&str, &str)]) -> String {
        let path = &self.config.disallowed_redirect_path;
        let (base, fragment) = path
            .split_once('#')
            .map_or((path.as_str(), None), |(base, fragment)| (base, Some(fragment)));

        let mut query = form_urlencoded::Serializer::new(String::new());
        query.extend_pairs(pairs);
        let separator = match base.split_once('?') {
            None => "?",
            Some((_, "")) => "",
            Some((_, existing)) if existing.ends_with('&') => "",
            Some(_) => "&",
        };

        let mut target = format!("{base}{separator}{}", query.finish());
        if let Some(fragment) = fragment {
            target.push('#');
            target.push_str(fragment);
        }
        target
    }
}
