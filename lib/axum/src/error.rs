//! Error types for the broker services.
//!
//! Each service reports its own context. Lower-level reports (store,
//! provider) stay attached as children when a service wraps them.

use std::fmt;

/// Errors talking to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OidcError {
    /// Client settings could not be turned into a usable client.
    Configuration { reason: String },
    /// Provider metadata was unreachable or malformed.
    Discovery { url: String, reason: String },
    /// The provider answered with an OAuth error.
    Provider {
        error: String,
        description: Option<String>,
    },
    /// The provider could not be reached or sent an unreadable reply.
    Transport { reason: String },
    /// The returned ID token was missing or failed a claim check.
    InvalidIdToken { reason: String },
}

impl fmt::Display for OidcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { reason } => {
                write!(f, "OIDC client configuration error: {reason}")
            }
            Self::Discovery { url, reason } => {
                write!(f, "OIDC discovery against {url} failed: {reason}")
            }
            Self::Provider {
                error,
                description: Some(description),
            } => {
                write!(f, "identity provider returned {error}: {description}")
            }
            Self::Provider {
                error,
                description: None,
            } => {
                write!(f, "identity provider returned {error}")
            }
            Self::Transport { reason } => {
                write!(f, "identity provider request failed: {reason}")
            }
            Self::InvalidIdToken { reason } => {
                write!(f, "invalid ID token: {reason}")
            }
        }
    }
}

impl std::error::Error for OidcError {}

/// Errors from the authentication flow that cannot be turned into a
/// redirect to the disallowed page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// Reading or writing the state or credential store failed.
    Store,
    /// No usable client exists for a policy.
    ClientUnavailable { policy: Option<String> },
    /// A URL could not be built from configuration.
    Configuration { reason: String },
    /// A validated token carried neither `sub` nor `oid`.
    MissingSubject,
    /// Request parameters could not be read.
    InvalidRequest { reason: String },
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store => write!(f, "session store operation failed"),
            Self::ClientUnavailable { policy: Some(policy) } => {
                write!(f, "no OIDC client available for policy '{policy}'")
            }
            Self::ClientUnavailable { policy: None } => {
                write!(f, "no OIDC client available for the default policy")
            }
            Self::Configuration { reason } => write!(f, "configuration error: {reason}"),
            Self::MissingSubject => write!(f, "token has no subject claim"),
            Self::InvalidRequest { reason } => write!(f, "invalid request: {reason}"),
        }
    }
}

impl std::error::Error for FlowError {}

/// Errors from refreshing a user's tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// The request has no session, or the session has no stored credential.
    NotAuthenticated,
    /// The stored credential carries no refresh token.
    MissingRefreshToken,
    /// No usable client exists for the credential's policy.
    ClientUnavailable { policy: Option<String> },
    /// The provider rejected the refresh token.
    Rejected,
    /// The CRM could not resolve roles for the contact.
    RoleResolution { contact_id: String },
    /// Reading or writing the credential store failed.
    Store,
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAuthenticated => write!(f, "no authenticated session to refresh"),
            Self::MissingRefreshToken => write!(f, "stored credential has no refresh token"),
            Self::ClientUnavailable { policy } => write!(
                f,
                "no OIDC client available for policy '{}'",
                policy.as_deref().unwrap_or("default")
            ),
            Self::Rejected => write!(f, "identity provider rejected the refresh token"),
            Self::RoleResolution { contact_id } => {
                write!(f, "failed to resolve roles for contact {contact_id}")
            }
            Self::Store => write!(f, "credential store operation failed"),
        }
    }
}

impl std::error::Error for RefreshError {}

/// Errors reported by a [`crate::RoleResolver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleResolutionError {
    /// The CRM could not be reached or answered with an error.
    Unavailable { reason: String },
    /// The CRM has no record of the contact.
    UnknownContact { contact_id: String },
}

impl fmt::Display for RoleResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "role lookup unavailable: {reason}"),
            Self::UnknownContact { contact_id } => write!(f, "unknown contact: {contact_id}"),
        }
    }
}

impl std::error::Error for RoleResolutionError {}
