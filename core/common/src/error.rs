//! Common error types for drivekit.

use thiserror::Error;

/// Top-level error type for drivekit operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The local client configuration artifact is missing or malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No usable cached credential exists.
    ///
    /// Recovered locally by running the authorization flow.
    #[error("No usable cached credential: {0}")]
    CredentialMissing(String),

    /// The interactive authorization flow could not produce a credential.
    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    /// The access token expired and could not be renewed.
    ///
    /// Delete the persisted token file and authorize again.
    #[error("Authorization expired: {0}")]
    AuthExpired(String),

    /// Writing the credential artifact failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Transport-level failure talking to a remote endpoint.
    #[error("Network error: {0}")]
    Network(String),

    /// The storage API answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or summary.
        message: String,
    },

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The remote service refused access to the resource.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error can only be fixed by authorizing again.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(self, Error::AuthExpired(_) | Error::AuthorizationFailed(_))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_reauthorization() {
        assert!(Error::AuthExpired("revoked".to_string()).requires_reauthorization());
        assert!(Error::AuthorizationFailed("bad code".to_string()).requires_reauthorization());
        assert!(!Error::Network("timeout".to_string()).requires_reauthorization());
        assert!(!Error::CredentialMissing("absent".to_string()).requires_reauthorization());
    }

    #[test]
    fn test_api_error_display() {
        let err = Error::Api {
            status: 500,
            message: "backend error".to_string(),
        };
        assert_eq!(err.to_string(), "API error (500): backend error");
    }
}
