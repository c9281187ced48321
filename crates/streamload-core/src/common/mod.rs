//! Shared error and identity types used by the load generator and its test
//! fixtures.
//!
//! ## Structure
//!
//! - [`error`] - Session-level error taxonomy.
//! - [`types`] - [`SessionId`](types::SessionId) and protocol defaults.

pub mod error;
pub mod types;

pub use error::{Error, Result};
