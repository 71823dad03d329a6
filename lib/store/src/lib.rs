//! Key/value storage for authentication attempts and credentials.
//!
//! [`Store`] is the contract every backend implements. Reads distinguish
//! a missing key from a failing backend: `Ok(None)` is "not found", while
//! `Err` is always a [`StoreError`]. [`JsonStore`] layers typed
//! serialization and key namespacing on top and reports reads as a
//! [`Lookup`].

pub mod error;
pub mod json;
pub mod lookup;
pub mod memory;
pub mod store;

pub use error::StoreError;
pub use json::JsonStore;
pub use lookup::Lookup;
pub use memory::MemoryStore;
pub use store::Store;
