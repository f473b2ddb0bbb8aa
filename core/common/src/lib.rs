//! Common utilities and types shared across drivekit crates.
//!
//! This module provides the error taxonomy used by the credential manager,
//! the storage client and the CLI, plus a redacting secret wrapper.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::Secret;
