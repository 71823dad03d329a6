//! Core types shared by every idm crate.
//!
//! This crate holds the `Result` alias used across the workspace and the
//! strongly-typed identifiers that flow between the stores, the protocol
//! layer and the hosting application.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ParseIdError, StateKey, StateToken, SubjectId};
