//! Optional host application hooks.
//!
//! Each hook has one fixed signature. Returning `None` means "no opinion"
//! and the broker carries on with its default response.

use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::response::Response;
use idm_identity::Credential;
use rootcause::Report;
use std::sync::Arc;
use url::Url;

use crate::error::FlowError;

/// Runs after a successful login, before the continuation page.
#[async_trait]
pub trait PreReturnPathRedirect: Send + Sync {
    async fn before_return(
        &self,
        headers: &HeaderMap,
        credential: &Credential,
        back_to_path: &str,
    ) -> Option<Response>;
}

/// Runs before the logout route clears the session. A response replaces
/// the whole default logout.
#[async_trait]
pub trait PreLogout: Send + Sync {
    async fn before_logout(&self, headers: &HeaderMap) -> Option<Response>;
}

/// Renders broker route failures.
#[async_trait]
pub trait OnError: Send + Sync {
    async fn on_error(&self, error: &Report<FlowError>, headers: &HeaderMap) -> Option<Response>;
}

/// Renders the page shown once a password reset has completed.
///
/// `continue_url` starts a fresh login with the user's original policy.
#[async_trait]
pub trait ResetPasswordConfirmation: Send + Sync {
    async fn confirm(&self, headers: &HeaderMap, continue_url: &Url) -> Option<Response>;
}

/// The set of hooks installed by the host application.
#[derive(Clone, Default)]
pub struct Hooks {
    pub pre_return_path_redirect: Option<Arc<dyn PreReturnPathRedirect>>,
    pub pre_logout: Option<Arc<dyn PreLogout>>,
    pub on_error: Option<Arc<dyn OnError>>,
    pub reset_password_confirmation: Option<Arc<dyn ResetPasswordConfirmation>>,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("pre_return_path_redirect", &self.pre_return_path_redirect.is_some())
            .field("pre_logout", &self.pre_logout.is_some())
            .field("on_error", &self.on_error.is_some())
            .field(
                "reset_password_confirmation",
                &self.reset_password_confirmation.is_some(),
            )
            .finish()
    }
}
