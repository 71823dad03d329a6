//! Strongly-typed identifiers.
//!
//! `SubjectId` names an authenticated user (the `sub`/`oid` claim).
//! `StateToken` is the opaque correlation value handed to the browser,
//! and `StateKey` is the fixed-length digest under which the matching
//! authentication attempt is stored.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when parsing an identifier from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of identifier that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

/// Generates a non-empty string newtype with the usual conversions.
macro_rules! define_string_id {
    ($(#[$meta:meta])* $name:ident, $label:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the identifier, returning the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if s.trim().is_empty() {
                    return Err(ParseIdError {
                        id_type: $label,
                        reason: "value is empty".to_string(),
                    });
                }
                Ok(Self(s.to_string()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// Stable identifier of an authenticated user.
    ///
    /// Keys the credential store and is the only value carried in the
    /// signed session cookie.
    SubjectId,
    "SubjectId"
);

define_string_id!(
    /// Externally visible correlation value for one authentication attempt.
    StateToken,
    "StateToken"
);

impl StateToken {
    /// Derives the storage key for this token.
    ///
    /// The key is the hex-encoded BLAKE3 digest of the token, so it has a
    /// fixed length whatever the caller supplied and the raw token never
    /// appears in the store.
    #[must_use]
    pub fn storage_key(&self) -> StateKey {
        let digest = blake3::hash(self.0.as_bytes());
        StateKey(hex::encode(digest.as_bytes()))
    }
}

/// Fixed-length, one-way storage key derived from a [`StateToken`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateKey(String);

impl StateKey {
    /// Length in characters of every state key.
    pub const LEN: usize = 64;

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
