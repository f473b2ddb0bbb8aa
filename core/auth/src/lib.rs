//! Delegated-authorization credential lifecycle for drivekit.
//!
//! This crate turns a client registration into an authenticated HTTP
//! transport:
//! - [`TokenStore`] caches the credential in an owner-only JSON file
//! - [`AuthorizationFlow`] obtains a fresh credential through user consent
//! - [`CredentialManager`] ties the two together and hands out transports
//! - [`AuthorizedTransport`] refreshes expired access tokens lazily, right
//!   before the request that needs them, and persists the result
//!
//! There is no background refresh timer; every request path checks the
//! expiry itself.

pub mod clock;
pub mod config;
pub mod flow;
pub mod manager;
pub mod oauth;
pub mod store;
pub mod token;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ClientConfig, DRIVE_SCOPE, OOB_REDIRECT_URL};
pub use flow::{
    AuthorizationFlow, ConsentCodeProvider, ConsoleCodeProvider, FlowState, StaticCodeProvider,
};
pub use manager::CredentialManager;
pub use oauth::OAuthClient;
pub use store::{TokenStore, DEFAULT_TOKEN_FILE};
pub use token::CredentialRecord;
pub use transport::AuthorizedTransport;
