//! Per-policy OIDC client.
//!
//! Discovery, the authorization URL and the token endpoint calls go
//! through the `oauth2` crate. ID token claims are decoded from the JWT
//! payload and checked for audience, expiry and nonce; signature and
//! issuer validation are left to the provider-facing infrastructure.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use idm_core::StateToken;
use idm_identity::{Claims, Credential, IdmConfig, TokenSet};
use oauth2::basic::{
    BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
    BasicTokenType,
};
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, Client, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, ExtraTokenFields, RedirectUrl, RefreshToken, RequestTokenError,
    Scope, StandardRevocableToken, StandardTokenResponse, TokenResponse, TokenUrl,
};
use rootcause::Report;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use crate::error::OidcError;

/// Error description prefix B2C uses when the user picks "forgot password".
pub const RESET_PASSWORD_ERROR_ID: &str = "AADB2C90118";

/// Token response fields beyond the OAuth2 standard set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdTokenFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl ExtraTokenFields for IdTokenFields {}

type IdmTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;

type IdmOAuthClient = Client<
    BasicErrorResponse,
    IdmTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

/// The subset of the discovery document the broker uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<Url>,
}

impl ProviderMetadata {
    /// Discovery URL for `policy`: the well-known document under
    /// `identity_app_url`, with `?p=<policy>` when a policy is named.
    ///
    /// # Errors
    ///
    /// Returns an error if `identity_app_url` is not a valid URL.
    pub fn discovery_url(
        identity_app_url: &str,
        policy: Option<&str>,
    ) -> Result<Url, Report<OidcError>> {
        let raw = format!(
            "{}/.well-known/openid-configuration",
            identity_app_url.trim_end_matches('/')
        );
        let mut url = Url::parse(&raw).map_err(|e| OidcError::Configuration {
            reason: format!("invalid identity_app_url: {e}"),
        })?;
        if let Some(policy) = policy {
            url.query_pairs_mut().append_pair("p", policy);
        }
        Ok(url)
    }

    /// Fetches and parses the discovery document at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`OidcError::Discovery`] if the document is unreachable or
    /// malformed.
    #[instrument(skip(http, url), fields(url = %url))]
    pub async fn discover(http: &reqwest::Client, url: Url) -> Result<Self, Report<OidcError>> {
        let discovery_error = |reason: String| OidcError::Discovery {
            url: url.to_string(),
            reason,
        };

        let response = http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| discovery_error(e.to_string()))?
            .error_for_status()
            .map_err(|e| discovery_error(e.to_string()))?;
        let metadata = response
            .json::<Self>()
            .await
            .map_err(|e| discovery_error(format!("malformed metadata: {e}")))?;

        debug!(issuer = %metadata.issuer, "discovered provider metadata");
        Ok(metadata)
    }
}

/// What to put in one authorization request.
#[derive(Debug, Clone)]
pub struct AuthorizationParams<'a> {
    pub state: &'a StateToken,
    pub nonce: Option<&'a str>,
    /// Space-separated scopes.
    pub scope: &'a str,
    pub force_login: bool,
    /// Additional query parameters passed through to the provider.
    pub extra: Vec<(&'static str, String)>,
}

/// An OIDC client bound to one policy.
#[derive(Debug)]
pub struct PolicyClient {
    policy: Option<String>,
    metadata: ProviderMetadata,
    oauth: IdmOAuthClient,
    http: reqwest::Client,
    client_id: String,
    clock_tolerance: i64,
}

impl PolicyClient {
    /// Binds discovered metadata to the configured client credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the callback URL cannot be built.
    pub fn new(
        config: &IdmConfig,
        http: reqwest::Client,
        policy: Option<String>,
        metadata: ProviderMetadata,
    ) -> Result<Self, Report<OidcError>> {
        let callback_url = config.callback_url().map_err(|report| {
            report.context(OidcError::Configuration {
                reason: "invalid callback URL".to_string(),
            })
        })?;

        let oauth: IdmOAuthClient = Client::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_type(AuthType::RequestBody)
            .set_auth_uri(AuthUrl::from_url(metadata.authorization_endpoint.clone()))
            .set_token_uri(TokenUrl::from_url(metadata.token_endpoint.clone()))
            .set_redirect_uri(RedirectUrl::from_url(callback_url));

        Ok(Self {
            policy,
            metadata,
            oauth,
            http,
            client_id: config.client_id.clone(),
            clock_tolerance: config.clock_tolerance(),
        })
    }

    #[must_use]
    pub fn policy(&self) -> Option<&str> {
        self.policy.as_deref()
    }

    #[must_use]
    pub fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    /// Builds the provider authorization URL for a code flow with
    /// `response_mode=form_post`.
    #[must_use]
    pub fn authorization_url(&self, params: AuthorizationParams<'_>) -> Url {
        let state = params.state.as_str().to_string();
        let mut request = self
            .oauth
            .authorize_url(move || CsrfToken::new(state))
            .add_scopes(
                params
                    .scope
                    .split_whitespace()
                    .map(|scope| Scope::new(scope.to_string())),
            )
            .add_extra_param("response_mode", "form_post");

        if let Some(nonce) = params.nonce {
            request = request.add_extra_param("nonce", nonce.to_string());
        }
        if params.force_login {
            request = request.add_extra_param("prompt", "login");
        }
        for (name, value) in params.extra {
            request = request.add_extra_param(name, value);
        }

        let (url, _state) = request.url();
        url
    }

    /// Exchanges an authorization code for a validated credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects the code, cannot be reached,
    /// or returns an ID token that fails validation.
    #[instrument(skip(self, code, expected_nonce), fields(policy = ?self.policy))]
    pub async fn exchange_code(
        &self,
        code: &str,
        expected_nonce: Option<&str>,
    ) -> Result<Credential, Report<OidcError>> {
        let response = self
            .oauth
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .map_err(token_error)?;
        debug!("authorization code exchanged");
        self.credential_from(&response, expected_nonce)
    }

    /// Exchanges a refresh token for a new validated credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects the refresh token, cannot be
    /// reached, or returns an ID token that fails validation.
    #[instrument(skip(self, refresh_token), fields(policy = ?self.policy))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<Credential, Report<OidcError>> {
        let response = self
            .oauth
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .map_err(token_error)?;
        debug!("refresh token exchanged");
        self.credential_from(&response, None)
    }

    fn credential_from(
        &self,
        response: &IdmTokenResponse,
        expected_nonce: Option<&str>,
    ) -> Result<Credential, Report<OidcError>> {
        let id_token = response
            .extra_fields()
            .id_token
            .clone()
            .ok_or_else(|| OidcError::InvalidIdToken {
                reason: "token response has no id_token".to_string(),
            })?;
        let claims = decode_claims(&id_token)?;
        self.check_claims(&claims, expected_nonce, Utc::now().timestamp())?;

        let token_type: &str = response.token_type().as_ref();
        let token_set = TokenSet {
            id_token,
            access_token: response.access_token().secret().clone(),
            refresh_token: response.refresh_token().map(|t| t.secret().clone()),
            token_type: token_type.to_string(),
            expires_at: response.expires_in().map(|ttl| {
                Utc::now().timestamp() + i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX / 2)
            }),
        };
        Ok(Credential::new(token_set, claims))
    }

    fn check_claims(
        &self,
        claims: &Claims,
        expected_nonce: Option<&str>,
        now: i64,
    ) -> Result<(), OidcError> {
        let invalid = |reason: &str| OidcError::InvalidIdToken {
            reason: reason.to_string(),
        };

        if !claims
            .aud
            .as_ref()
            .is_some_and(|aud| aud.contains(&self.client_id))
        {
            return Err(invalid("audience does not include this client"));
        }
        match claims.exp {
            Some(exp) if exp.saturating_add(self.clock_tolerance) > now => {}
            Some(_) => return Err(invalid("token has expired")),
            None => return Err(invalid("token has no exp claim")),
        }
        if let Some(expected) = expected_nonce
            && claims.nonce.as_deref() != Some(expected)
        {
            return Err(invalid("nonce mismatch"));
        }
        if claims.subject().is_none() {
            return Err(invalid("token has neither sub nor oid"));
        }
        Ok(())
    }
}

/// Decodes the payload segment of a compact JWT into [`Claims`].
///
/// # Errors
///
/// Returns [`OidcError::InvalidIdToken`] if the token is not a three-part
/// JWT or its payload is not a JSON claims object.
pub fn decode_claims(id_token: &str) -> Result<Claims, OidcError> {
    let parts: Vec<&str> = id_token.split('.').collect();
    if parts.len() != 3 {
        return Err(OidcError::InvalidIdToken {
            reason: "invalid JWT format".to_string(),
        });
    }

    let payload = URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|e| OidcError::InvalidIdToken {
            reason: format!("failed to decode JWT payload: {e}"),
        })?;
    serde_json::from_slice(&payload).map_err(|e| OidcError::InvalidIdToken {
        reason: format!("failed to parse JWT payload: {e}"),
    })
}

fn token_error<RE>(err: RequestTokenError<RE, BasicErrorResponse>) -> OidcError
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => OidcError::Provider {
            error: response.error().to_string(),
            description: response.error_description().cloned(),
        },
        RequestTokenError::Request(e) => OidcError::Transport {
            reason: e.to_string(),
        },
        other => OidcError::Transport {
            reason: other.to_string(),
        },
    }
}
