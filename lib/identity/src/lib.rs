//! Identity domain types for the idm login broker.
//!
//! This crate has no I/O. It defines what the broker stores and reasons
//! about:
//! - [`IdmConfig`]: recognized options and their validation
//! - [`AuthenticationAttempt`]: the record correlating an outbound redirect
//!   with its callback
//! - [`Credential`], [`TokenSet`] and [`Claims`]: stored token material
//! - [`RoleSet`]: the organisation/role/status projection of CRM roles

pub mod attempt;
pub mod config;
pub mod credential;
pub mod error;
pub mod role;

pub use attempt::AuthenticationAttempt;
pub use config::IdmConfig;
pub use credential::{Audience, Claims, Credential, TokenSet};
pub use error::{ConfigError, RoleParseError};
pub use role::{FlatRole, OrgRole, OrgRoles, Organisation, RoleSet, RoleStatus, ServiceRoles};
