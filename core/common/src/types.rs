//! Common types used throughout drivekit.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// Secret string that zeroizes on drop and never prints its value.
///
/// Serializes transparently, so persisted artifacts hold the plain value.
#[derive(Clone, PartialEq, Eq, Zeroize, Serialize, Deserialize)]
#[zeroize(drop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the secret value.
    ///
    /// Callers must not log the returned string.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Get the length.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret([REDACTED; {} chars])", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::new("ya29.very-secret");
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_secret_serializes_transparently() {
        let secret = Secret::new("abc");
        assert_eq!(serde_json::to_string(&secret).unwrap(), "\"abc\"");

        let parsed: Secret = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(parsed, secret);
        assert_eq!(parsed.expose(), "abc");
    }

    #[test]
    fn test_secret_empty() {
        assert!(Secret::new("").is_empty());
        assert_eq!(Secret::from("four").len(), 4);
    }
}
