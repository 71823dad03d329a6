//! Authentication attempt records.

use serde::{Deserialize, Serialize};

/// One outbound authentication redirect awaiting its callback.
///
/// Stored under the hash of the attempt's state token and consumed exactly
/// once. `policy_pre_password_reset` is only set while the user is inside
/// the reset-password policy and names the policy to return to afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationAttempt {
    pub policy_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journey: Option<String>,
    pub back_to_path: String,
    #[serde(default)]
    pub force_login: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_pre_password_reset: Option<String>,
}

impl AuthenticationAttempt {
    #[must_use]
    pub fn new(policy_name: impl Into<String>, back_to_path: impl Into<String>) -> Self {
        Self {
            policy_name: policy_name.into(),
            journey: None,
            back_to_path: back_to_path.into(),
            force_login: false,
            nonce: None,
            policy_pre_password_reset: None,
        }
    }

    /// True while this attempt is the reset-password leg of another login.
    #[must_use]
    pub fn is_password_reset(&self) -> bool {
        self.policy_pre_password_reset.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_camel_case_keys() {
        let mut attempt = AuthenticationAttempt::new("b2c_1_signin", "/account");
        attempt.force_login = true;
        attempt.policy_pre_password_reset = Some("b2c_1_signin".to_string());

        let json = serde_json::to_value(&attempt).expect("serialize");
        assert_eq!(json["policyName"], "b2c_1_signin");
        assert_eq!(json["backToPath"], "/account");
        assert_eq!(json["forceLogin"], true);
        assert_eq!(json["policyPrePasswordReset"], "b2c_1_signin");
        assert!(json.get("nonce").is_none());
    }

    #[test]
    fn optional_fields_default_when_absent() {
        let attempt: AuthenticationAttempt =
            serde_json::from_str(r#"{"policyName":"p","backToPath":"/"}"#).expect("deserialize");
        assert!(!attempt.force_login);
        assert!(attempt.journey.is_none());
        assert!(!attempt.is_password_reset());
    }
}
