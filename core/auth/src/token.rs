//! Delegated-authorization credential record.

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};

use drivekit_common::Secret;

/// Tokens are renewed this long before they actually expire.
pub const EXPIRY_SKEW_SECONDS: i64 = 10;

/// Access/refresh token pair with expiration tracking.
///
/// Serialized with the field names common OAuth2 token caches use, so a
/// token file written by other tooling loads unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Access token for API requests.
    pub access_token: Secret,
    /// Scheme for the `Authorization` header, usually `Bearer`.
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Refresh token for obtaining new access tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<Secret>,
    /// When the access token expires. `None` means it does not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl CredentialRecord {
    /// Build a bearer record.
    pub fn new(
        access_token: impl Into<Secret>,
        refresh_token: Option<Secret>,
        expiry: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
            refresh_token,
            expiry,
        }
    }

    /// Check if the access token is expired or about to expire at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            None => false,
            // Zero timestamp written by other OAuth2 tooling also means no expiry.
            Some(expiry) if expiry.year() <= 1 => false,
            Some(expiry) => expiry - Duration::seconds(EXPIRY_SKEW_SECONDS) <= now,
        }
    }

    /// Whether the record can be renewed without user interaction.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_ref()
            .map(|token| !token.is_empty())
            .unwrap_or(false)
    }

    /// Value for the `Authorization` header.
    pub fn authorization_header(&self) -> String {
        let scheme = if self.token_type.is_empty() || self.token_type.eq_ignore_ascii_case("bearer")
        {
            "Bearer"
        } else {
            self.token_type.as_str()
        };
        format!("{} {}", scheme, self.access_token.expose())
    }
}
