//! Stored token material and decoded ID token claims.

use chrono::Utc;
use idm_core::SubjectId;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RoleParseError;
use crate::role::{RoleSet, ServiceRoles};

/// Tokens returned by the identity provider for one login or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub id_token: String,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: String,
    /// Access token expiry, seconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

/// The `aud` claim, which providers send either as a string or an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    #[must_use]
    pub fn contains(&self, client_id: &str) -> bool {
        match self {
            Self::One(aud) => aud == client_id,
            Self::Many(auds) => auds.iter().any(|aud| aud == client_id),
        }
    }
}

/// Decoded ID token claims.
///
/// Claims the broker acts on are typed; everything else the provider sends
/// is kept in `extra` and written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    /// Expiry, seconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Trust framework policy that issued the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tfp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acr: Option<String>,
    #[serde(
        rename = "contactId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub contact_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    #[serde(
        rename = "roleMappings",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub role_mappings: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// The user's stable identifier: `sub`, falling back to `oid`.
    #[must_use]
    pub fn subject(&self) -> Option<SubjectId> {
        self.sub
            .as_deref()
            .or(self.oid.as_deref())
            .and_then(|id| id.parse().ok())
    }

    /// The policy that issued these claims: `tfp`, falling back to `acr`.
    #[must_use]
    pub fn policy(&self) -> Option<&str> {
        self.tfp.as_deref().or(self.acr.as_deref())
    }

    /// True if the issuing policy is `policy`, ignoring ASCII case.
    #[must_use]
    pub fn issued_by_policy(&self, policy: &str) -> bool {
        self.policy()
            .is_some_and(|issued| issued.eq_ignore_ascii_case(policy))
    }

    /// Layers CRM roles onto the claims, replacing any previous roles.
    pub fn merge_roles(&mut self, service_roles: ServiceRoles) {
        self.roles = Some(service_roles.roles);
        self.role_mappings = Some(service_roles.mappings);
    }

    /// Parses the embedded roles into a [`RoleSet`].
    ///
    /// Returns `Ok(None)` for users without any roles.
    ///
    /// # Errors
    ///
    /// Returns an error if the roles or mappings are malformed.
    pub fn role_set(&self) -> Result<Option<RoleSet>, Report<RoleParseError>> {
        RoleSet::parse(
            self.roles.as_deref().unwrap_or_default(),
            self.role_mappings.as_deref().unwrap_or_default(),
        )
    }
}

/// Token material and claims stored for an authenticated user.
///
/// A fresh value is decoded on every read; expiry is always checked
/// against the claims, never assumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub token_set: TokenSet,
    pub claims: Claims,
}

impl Credential {
    #[must_use]
    pub fn new(token_set: TokenSet, claims: Claims) -> Self {
        Self { token_set, claims }
    }

    #[must_use]
    pub fn subject(&self) -> Option<SubjectId> {
        self.claims.subject()
    }

    /// True once the ID token's `exp` has passed. A credential without
    /// `exp` counts as expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp())
    }

    /// Expiry check against an explicit clock reading in epoch seconds.
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.claims.exp.is_none_or(|exp| exp <= now)
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.token_set.refresh_token.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token_set() -> TokenSet {
        TokenSet {
            id_token: "header.payload.sig".to_string(),
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            token_type: "Bearer".to_string(),
            expires_at: None,
        }
    }

    fn credential_expiring_at(exp: Option<i64>) -> Credential {
        Credential::new(
            token_set(),
            Claims {
                sub: Some("user-1".to_string()),
                exp,
                ..Claims::default()
            },
        )
    }

    #[test]
    fn expired_one_second_ago() {
        let now = Utc::now().timestamp();
        assert!(credential_expiring_at(Some(now - 1)).is_expired());
    }

    #[test]
    fn not_expired_for_an_hour() {
        let now = Utc::now().timestamp();
        assert!(!credential_expiring_at(Some(now + 3600)).is_expired());
    }

    #[test]
    fn missing_exp_counts_as_expired() {
        assert!(credential_expiring_at(None).is_expired_at(0));
    }

    #[test]
    fn subject_falls_back_to_oid() {
        let claims = Claims {
            oid: Some("object-7".to_string()),
            ..Claims::default()
        };
        assert_eq!(
            claims.subject().map(|s| s.to_string()),
            Some("object-7".to_string())
        );
        assert!(Claims::default().subject().is_none());
    }

    #[test]
    fn policy_prefers_tfp_and_compares_case_insensitively() {
        let claims = Claims {
            tfp: Some("B2C_1A_ResetPassword".to_string()),
            acr: Some("b2c_1a_signin".to_string()),
            ..Claims::default()
        };
        assert_eq!(claims.policy(), Some("B2C_1A_ResetPassword"));
        assert!(claims.issued_by_policy("b2c_1a_resetpassword"));
        assert!(!claims.issued_by_policy("b2c_1a_signin"));
    }

    #[test]
    fn unknown_claims_survive_a_round_trip() {
        let raw = json!({
            "sub": "u",
            "exp": 10,
            "aud": ["client", "other"],
            "contactId": "c-1",
            "email": "someone@example.com"
        });
        let claims: Claims = serde_json::from_value(raw.clone()).expect("deserialize");
        assert_eq!(claims.contact_id.as_deref(), Some("c-1"));
        assert!(claims.aud.as_ref().is_some_and(|a| a.contains("client")));
        assert_eq!(claims.extra["email"], "someone@example.com");
        assert_eq!(serde_json::to_value(&claims).expect("serialize"), raw);
    }

    #[test]
    fn merge_roles_replaces_previous_roles() {
        let mut claims = Claims {
            roles: Some(vec!["old".to_string()]),
            ..Claims::default()
        };
        claims.merge_roles(ServiceRoles {
            roles: vec!["o:r:1".to_string()],
            mappings: vec![
                "o:Org".to_string(),
                "r:Role".to_string(),
                "1:Active".to_string(),
            ],
        });
        assert_eq!(claims.roles, Some(vec!["o:r:1".to_string()]));
        let set = claims.role_set().expect("parse").expect("non-empty");
        assert_eq!(set.flat.len(), 1);
    }
}
