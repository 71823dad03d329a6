//! Error types for the identity crate.

use std::fmt;

/// Errors from configuration validation.
///
/// Any of these is fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required option was absent or empty.
    Missing { field: &'static str },
    /// An option was present but unusable.
    Invalid { field: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { field } => {
                write!(f, "missing required configuration option: {field}")
            }
            Self::Invalid { field, reason } => {
                write!(f, "invalid configuration option {field}: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors from parsing CRM role data into a [`crate::RoleSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleParseError {
    /// A role entry was not an `org:role:status` triple.
    MalformedRole { value: String },
    /// A mapping entry was not an `id:name` pair.
    MalformedMapping { value: String },
    /// A role referenced an id with no entry in the mappings.
    UnmappedId { id: String },
}

impl fmt::Display for RoleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedRole { value } => {
                write!(f, "malformed role entry '{value}', expected org:role:status")
            }
            Self::MalformedMapping { value } => {
                write!(f, "malformed role mapping '{value}', expected id:name")
            }
            Self::UnmappedId { id } => {
                write!(f, "role references id '{id}' with no mapping")
            }
        }
    }
}

impl std::error::Error for RoleParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::Missing { field: "client_id" };
        assert!(err.to_string().contains("client_id"));

        let err = ConfigError::Invalid {
            field: "cookie_password",
            reason: "too short".to_string(),
        };
        assert!(err.to_string().contains("cookie_password"));
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn role_parse_error_display() {
        let err = RoleParseError::UnmappedId {
            id: "org-9".to_string(),
        };
        assert!(err.to_string().contains("org-9"));
    }
}
