//! Client registration data loaded from the credentials file.

use serde::Deserialize;
use std::path::Path;

use drivekit_common::{Error, Result, Secret};

/// Google OAuth2 authorization endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
/// Google OAuth2 token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// Out-of-band redirect: the consent page shows the code for the user to copy.
pub const OOB_REDIRECT_URL: &str = "urn:ietf:wg:oauth:2.0:oob";
/// Full read/write access to the user's Drive.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Application registration: who we are and where to ask for tokens.
///
/// Built once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    client_id: String,
    client_secret: Secret,
    auth_url: String,
    token_url: String,
    redirect_url: String,
    scopes: Vec<String>,
}

/// `{"installed": {...}}` / `{"web": {...}}` as downloaded from the Google console.
#[derive(Deserialize)]
struct ConsoleFile {
    #[serde(alias = "web")]
    installed: ConsoleApp,
}

#[derive(Deserialize)]
struct ConsoleApp {
    client_id: String,
    #[serde(default)]
    client_secret: String,
    #[serde(default = "default_auth_url")]
    auth_uri: String,
    #[serde(default = "default_token_url")]
    token_uri: String,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

#[derive(Deserialize)]
struct FlatFile {
    client_id: String,
    #[serde(default)]
    client_secret: String,
    #[serde(default = "default_auth_url")]
    auth_url: String,
    #[serde(default = "default_token_url")]
    token_url: String,
    #[serde(default)]
    redirect_url: Option<String>,
    #[serde(default)]
    scopes: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CredentialsFile {
    Console(ConsoleFile),
    Flat(FlatFile),
}

fn default_auth_url() -> String {
    GOOGLE_AUTH_URL.to_string()
}

fn default_token_url() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

impl ClientConfig {
    /// Create a configuration with the out-of-band redirect and no scopes.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        auth_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: Secret::new(client_secret.into()),
            auth_url: auth_url.into(),
            token_url: token_url.into(),
            redirect_url: OOB_REDIRECT_URL.to_string(),
            scopes: Vec::new(),
        }
    }

    /// Replace the redirect URL.
    pub fn with_redirect_url(mut self, redirect_url: impl Into<String>) -> Self {
        self.redirect_url = redirect_url.into();
        self
    }

    /// Replace the requested scope set.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Load the credentials file.
    ///
    /// `scopes` overrides any scopes in the file; when both are empty the
    /// full Drive scope is requested.
    ///
    /// # Errors
    /// - `Error::Configuration` if the file is missing or malformed
    pub fn from_file(path: impl AsRef<Path>, scopes: &[String]) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            Error::Configuration(format!(
                "Unable to read credentials file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_json(&data, scopes)
    }

    /// Parse credentials JSON in either the console layout or the flat layout.
    pub fn from_json(data: &[u8], scopes: &[String]) -> Result<Self> {
        let file: CredentialsFile = serde_json::from_slice(data).map_err(|e| {
            Error::Configuration(format!("Malformed credentials file: {}", e))
        })?;

        let mut config = match file {
            CredentialsFile::Console(ConsoleFile { installed: app }) => {
                let redirect = app
                    .redirect_uris
                    .first()
                    .cloned()
                    .unwrap_or_else(|| OOB_REDIRECT_URL.to_string());
                Self::new(app.client_id, app.client_secret, app.auth_uri, app.token_uri)
                    .with_redirect_url(redirect)
            }
            CredentialsFile::Flat(flat) => {
                let config =
                    Self::new(flat.client_id, flat.client_secret, flat.auth_url, flat.token_url)
                        .with_scopes(flat.scopes);
                match flat.redirect_url {
                    Some(redirect) => config.with_redirect_url(redirect),
                    None => config,
                }
            }
        };

        if !scopes.is_empty() {
            config.scopes = scopes.to_vec();
        }
        if config.scopes.is_empty() {
            config.scopes = vec![DRIVE_SCOPE.to_string()];
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::Configuration("client_id is empty".to_string()));
        }
        if self.token_url.trim().is_empty() {
            return Err(Error::Configuration("token URL is empty".to_string()));
        }
        Ok(())
    }

    /// Client identifier.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Client secret.
    pub fn client_secret(&self) -> &Secret {
        &self.client_secret
    }

    /// Authorization (consent page) URL.
    pub fn auth_url(&self) -> &str {
        &self.auth_url
    }

    /// Token exchange URL.
    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Redirect URL registered for this client.
    pub fn redirect_url(&self) -> &str {
        &self.redirect_url
    }

    /// Requested scopes.
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONSOLE_JSON: &str = r#"{
        "installed": {
            "client_id": "123.apps.googleusercontent.com",
            "project_id": "demo",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_secret": "shh",
            "redirect_uris": ["http://localhost"]
        }
    }"#;

    #[test]
    fn test_console_layout() {
        let config = ClientConfig::from_json(CONSOLE_JSON.as_bytes(), &[]).unwrap();

        assert_eq!(config.client_id(), "123.apps.googleusercontent.com");
        assert_eq!(config.client_secret().expose(), "shh");
        assert_eq!(config.token_url(), GOOGLE_TOKEN_URL);
        assert_eq!(config.redirect_url(), "http://localhost");
        assert_eq!(config.scopes(), &[DRIVE_SCOPE.to_string()]);
    }

    #[test]
    fn test_web_layout_without_redirects() {
        let json = r#"{"web": {"client_id": "c1", "client_secret": "s1"}}"#;
        let config = ClientConfig::from_json(json.as_bytes(), &[]).unwrap();

        assert_eq!(config.client_id(), "c1");
        assert_eq!(config.auth_url(), GOOGLE_AUTH_URL);
        assert_eq!(config.redirect_url(), OOB_REDIRECT_URL);
    }

    #[test]
    fn test_flat_layout_with_scopes() {
        let json = r#"{
            "client_id": "c1",
            "client_secret": "s1",
            "auth_url": "http://127.0.0.1:9/auth",
            "token_url": "http://127.0.0.1:9/token",
            "scopes": ["storage"]
        }"#;
        let config = ClientConfig::from_json(json.as_bytes(), &[]).unwrap();

        assert_eq!(config.scopes(), &["storage".to_string()]);
        assert_eq!(config.token_url(), "http://127.0.0.1:9/token");
    }

    #[test]
    fn test_scope_override() {
        let scopes = vec!["https://www.googleapis.com/auth/drive.file".to_string()];
        let config = ClientConfig::from_json(CONSOLE_JSON.as_bytes(), &scopes).unwrap();
        assert_eq!(config.scopes(), scopes.as_slice());
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let temp = TempDir::new().unwrap();
        let result = ClientConfig::from_file(temp.path().join("credentials.json"), &[]);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_malformed_file_is_configuration_error() {
        let result = ClientConfig::from_json(b"{not json", &[]);
        assert!(matches!(result, Err(Error::Configuration(_))));

        let result = ClientConfig::from_json(br#"{"client_id": ""}"#, &[]);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_debug_hides_secret() {
        let config = ClientConfig::new("c1", "topsecret", "a", "t");
        assert!(!format!("{:?}", config).contains("topsecret"));
    }
}
