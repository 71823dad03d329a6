//! Broker configuration.
//!
//! All options deserialize with serde so that the hosting application can
//! load them with the `config` crate (for example from `IDM__*`
//! environment variables). Options with defaults may be omitted.

use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

/// Minimum length of the cookie signing password.
pub const MIN_COOKIE_PASSWORD_LEN: usize = 32;

/// Minimum clock skew tolerated when checking ID token expiry.
pub const MIN_CLOCK_TOLERANCE_SECS: u64 = 300;

/// Configuration of the login broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdmConfig {
    /// Base URL of the identity provider, e.g.
    /// `https://tenant.b2clogin.com/tenant.onmicrosoft.com/v2.0`.
    pub identity_app_url: String,
    pub tenant_id: String,
    /// Service identifier passed to the CRM when resolving roles.
    pub service_id: String,
    pub client_id: String,
    pub client_secret: String,
    /// Externally visible origin of the hosting application.
    pub app_domain: String,

    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Secret the session cookie signing key is derived from.
    pub cookie_password: String,
    /// Key prefix shared by everything the broker writes to the store.
    #[serde(default = "default_cache_segment")]
    pub cache_segment: String,
    /// Lifetime of stored credentials and of the session cookie.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Lifetime of a pending authentication attempt.
    #[serde(default = "default_state_ttl_secs")]
    pub state_ttl_secs: u64,

    /// Policy used when a request does not name one.
    #[serde(default)]
    pub default_policy: Option<String>,
    #[serde(default)]
    pub default_journey: Option<String>,
    pub reset_password_policy: String,
    #[serde(default = "default_scope")]
    pub default_scope: String,

    #[serde(default = "default_outbound_path")]
    pub outbound_path: String,
    /// Path of the callback route.
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    /// Absolute callback URL registered with the identity provider.
    ///
    /// When unset the callback URL is `app_domain` joined with
    /// `redirect_uri`. This is the only override; outbound generation and
    /// code exchange always use the same value. Its path must equal
    /// `redirect_uri`, where the callback route is mounted.
    #[serde(default)]
    pub callback_url: Option<String>,
    /// Path of the logout route. Empty disables the route.
    #[serde(default = "default_logout_path")]
    pub logout_path: String,
    #[serde(default = "default_disallowed_redirect_path")]
    pub disallowed_redirect_path: String,
    #[serde(default = "default_back_to_path")]
    pub default_back_to_path: String,
    /// Route serving the script used by the post-login continuation page.
    #[serde(default = "default_post_authentication_redirect_js_path")]
    pub post_authentication_redirect_js_path: String,

    #[serde(default = "default_is_secure")]
    pub is_secure: bool,
    /// Send denied requests straight to the identity provider instead of the
    /// disallowed page.
    #[serde(default)]
    pub login_on_disallow: bool,
    /// Treat a stored but expired credential as unauthenticated at the gate.
    ///
    /// Off by default so applications can refresh transparently.
    #[serde(default)]
    pub reject_expired_sessions: bool,

    #[serde(default = "default_clock_tolerance_secs")]
    pub clock_tolerance_secs: u64,
    /// Timeout applied to every call to the identity provider.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
}

fn default_cookie_name() -> String {
    "idm".to_string()
}

fn default_cache_segment() -> String {
    "idm".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_state_ttl_secs() -> u64 {
    10 * 60
}

fn default_scope() -> String {
    "openid offline_access".to_string()
}

fn default_outbound_path() -> String {
    "/login/out".to_string()
}

fn default_redirect_uri() -> String {
    "/login/return".to_string()
}

fn default_logout_path() -> String {
    "/logout".to_string()
}

fn default_disallowed_redirect_path() -> String {
    "/error".to_string()
}

fn default_back_to_path() -> String {
    "/".to_string()
}

fn default_post_authentication_redirect_js_path() -> String {
    "/idm/postAuthenticationRedirect.js".to_string()
}

fn default_is_secure() -> bool {
    true
}

fn default_clock_tolerance_secs() -> u64 {
    MIN_CLOCK_TOLERANCE_SECS
}

fn default_http_timeout_ms() -> u64 {
    2500
}

impl IdmConfig {
    /// Creates a configuration with defaults for every optional field.
    #[must_use]
    pub fn new(
        identity_app_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        app_domain: impl Into<String>,
        cookie_password: impl Into<String>,
    ) -> Self {
        Self {
            identity_app_url: identity_app_url.into(),
            tenant_id: String::new(),
            service_id: String::new(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            app_domain: app_domain.into(),
            cookie_name: default_cookie_name(),
            cookie_password: cookie_password.into(),
            cache_segment: default_cache_segment(),
            cache_ttl_secs: default_cache_ttl_secs(),
            state_ttl_secs: default_state_ttl_secs(),
            default_policy: None,
            default_journey: None,
            reset_password_policy: String::new(),
            default_scope: default_scope(),
            outbound_path: default_outbound_path(),
            redirect_uri: default_redirect_uri(),
            callback_url: None,
            logout_path: default_logout_path(),
            disallowed_redirect_path: default_disallowed_redirect_path(),
            default_back_to_path: default_back_to_path(),
            post_authentication_redirect_js_path: default_post_authentication_redirect_js_path(),
            is_secure: default_is_secure(),
            login_on_disallow: false,
            reject_expired_sessions: false,
            clock_tolerance_secs: default_clock_tolerance_secs(),
            http_timeout_ms: default_http_timeout_ms(),
        }
    }

    /// Checks every option, returning the first problem found.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the offending option.
    pub fn validate(&self) -> Result<(), Report<ConfigError>> {
        for (field, value) in [
            ("identity_app_url", &self.identity_app_url),
            ("tenant_id", &self.tenant_id),
            ("service_id", &self.service_id),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("app_domain", &self.app_domain),
            ("cookie_name", &self.cookie_name),
            ("cookie_password", &self.cookie_password),
            ("cache_segment", &self.cache_segment),
            ("reset_password_policy", &self.reset_password_policy),
            ("default_scope", &self.default_scope),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing { field }.into());
            }
        }

        if self.cookie_password.chars().count() < MIN_COOKIE_PASSWORD_LEN {
            return Err(ConfigError::Invalid {
                field: "cookie_password",
                reason: format!("must be at least {MIN_COOKIE_PASSWORD_LEN} characters"),
            }
            .into());
        }

        absolute_url("identity_app_url", &self.identity_app_url)?;
        absolute_url("app_domain", &self.app_domain)?;
        if let Some(callback_url) = &self.callback_url
            && absolute_url("callback_url", callback_url)?.path() != self.redirect_uri
        {
            return Err(ConfigError::Invalid {
                field: "callback_url",
                reason: format!("path must equal redirect_uri ({})", self.redirect_uri),
            }
            .into());
        }

        for (field, value) in [
            ("outbound_path", &self.outbound_path),
            ("redirect_uri", &self.redirect_uri),
            ("disallowed_redirect_path", &self.disallowed_redirect_path),
            ("default_back_to_path", &self.default_back_to_path),
            (
                "post_authentication_redirect_js_path",
                &self.post_authentication_redirect_js_path,
            ),
        ] {
            route_path(field, value)?;
        }
        if !self.logout_path.is_empty() {
            route_path("logout_path", &self.logout_path)?;
        }

        let mut routes = vec![
            ("outbound_path", self.outbound_path.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            (
                "post_authentication_redirect_js_path",
                self.post_authentication_redirect_js_path.as_str(),
            ),
        ];
        if self.logout_enabled() {
            routes.push(("logout_path", self.logout_path.as_str()));
        }
        for (i, &(field, path)) in routes.iter().enumerate() {
            if path.contains(['?', '#']) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "a route path cannot carry a query or fragment".to_string(),
                }
                .into());
            }
            if let Some((other, _)) = routes[..i].iter().find(|(_, seen)| *seen == path) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("collides with {other}"),
                }
                .into());
            }
        }

        if self.login_on_disallow && self.default_policy.is_none() {
            return Err(ConfigError::Invalid {
                field: "login_on_disallow",
                reason: "requires default_policy".to_string(),
            }
            .into());
        }

        if self.clock_tolerance_secs < MIN_CLOCK_TOLERANCE_SECS {
            return Err(ConfigError::Invalid {
                field: "clock_tolerance_secs",
                reason: format!("must be at least {MIN_CLOCK_TOLERANCE_SECS}"),
            }
            .into());
        }

        if self.cache_ttl_secs == 0 || self.state_ttl_secs == 0 || self.http_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "cache_ttl_secs/state_ttl_secs/http_timeout_ms",
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Absolute callback URL handed to the identity provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured URLs do not parse.
    pub fn callback_url(&self) -> Result<Url, Report<ConfigError>> {
        match &self.callback_url {
            Some(url) => absolute_url("callback_url", url),
            None => app_url(&self.app_domain, &self.redirect_uri),
        }
    }

    /// Absolute URL of `path` on the hosting application.
    ///
    /// # Errors
    ///
    /// Returns an error if `app_domain` does not parse.
    pub fn app_url(&self, path: &str) -> Result<Url, Report<ConfigError>> {
        app_url(&self.app_domain, path)
    }

    #[must_use]
    pub fn logout_enabled(&self) -> bool {
        !self.logout_path.is_empty()
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    #[must_use]
    pub fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_secs)
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Clock tolerance as signed seconds, for comparing against `exp`.
    #[must_use]
    pub fn clock_tolerance(&self) -> i64 {
        i64::try_from(self.clock_tolerance_secs).unwrap_or(i64::MAX)
    }
}

fn absolute_url(field: &'static str, value: &str) -> Result<Url, Report<ConfigError>> {
    let url = Url::parse(value).map_err(|e| ConfigError::Invalid {
        field,
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            field,
            reason: "must be an absolute http(s) URL".to_string(),
        }
        .into());
    }
    Ok(url)
}

fn app_url(app_domain: &str, path: &str) -> Result<Url, Report<ConfigError>> {
    absolute_url("app_domain", app_domain)?
        .join(path)
        .map_err(|e| {
            ConfigError::Invalid {
                field: "app_domain",
                reason: e.to_string(),
            }
            .into()
        })
}

fn route_path(field: &'static str, value: &str) -> Result<(), Report<ConfigError>> {
    if value.starts_with('/') {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: "must start with '/'".to_string(),
        }
        .into())
    }
}
