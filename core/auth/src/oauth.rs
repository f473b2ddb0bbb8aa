//! Token endpoint conversations: authorization URL, code exchange, refresh.

use chrono::{DateTime, Duration, Utc};
use oauth2::basic::{BasicClient, BasicTokenResponse, BasicTokenType};
use oauth2::{
    reqwest, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet,
    EndpointSet, RedirectUrl, RefreshToken, RequestTokenError, Scope, TokenResponse, TokenUrl,
};

use drivekit_common::{Error, Result, Secret};

use crate::config::ClientConfig;
use crate::token::CredentialRecord;

type ConfiguredClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// OAuth2 client bound to one [`ClientConfig`].
#[derive(Clone)]
pub struct OAuthClient {
    client: ConfiguredClient,
    http: reqwest::Client,
    scopes: Vec<String>,
}

impl OAuthClient {
    /// Create a new OAuth2 client.
    ///
    /// # Errors
    /// - `Error::Configuration` if any endpoint URL is invalid
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut client = BasicClient::new(ClientId::new(config.client_id().to_string()))
            .set_auth_uri(
                AuthUrl::new(config.auth_url().to_string())
                    .map_err(|e| Error::Configuration(format!("Invalid auth URL: {}", e)))?,
            )
            .set_token_uri(
                TokenUrl::new(config.token_url().to_string())
                    .map_err(|e| Error::Configuration(format!("Invalid token URL: {}", e)))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(config.redirect_url().to_string())
                    .map_err(|e| Error::Configuration(format!("Invalid redirect URL: {}", e)))?,
            );

        if !config.client_secret().is_empty() {
            client = client.set_client_secret(ClientSecret::new(
                config.client_secret().expose().to_string(),
            ));
        }

        let http = reqwest::ClientBuilder::new()
            // Token endpoints must not redirect; following them invites SSRF.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            http,
            scopes: config.scopes().to_vec(),
        })
    }

    /// Generate the consent URL for the user to visit.
    ///
    /// Requests offline access so the token endpoint issues a refresh token.
    /// Returns the URL and the state token embedded in it.
    pub fn authorization_url(&self) -> (String, String) {
        let (auth_url, csrf_token) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .add_extra_param("access_type", "offline")
            .url();

        (auth_url.to_string(), csrf_token.secret().clone())
    }

    /// Exchange a one-time authorization code for a credential.
    ///
    /// # Errors
    /// - `Error::AuthorizationFailed` for a rejected code or a network failure
    pub async fn exchange_code(&self, code: &str, now: DateTime<Utc>) -> Result<CredentialRecord> {
        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| Error::AuthorizationFailed(format!("Token exchange failed: {}", e)))?;

        Ok(record_from_response(&response, None, now))
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// The previous refresh token is kept when the server does not rotate it.
    ///
    /// # Errors
    /// - `Error::AuthExpired` if the token endpoint rejects the refresh token
    /// - `Error::Network` if the endpoint is unreachable or its reply is unreadable
    pub async fn refresh(&self, refresh_token: &Secret, now: DateTime<Utc>) -> Result<CredentialRecord> {
        let response = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.expose().to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| match e {
                RequestTokenError::ServerResponse(response) => {
                    Error::AuthExpired(format!("Token refresh rejected: {}", response))
                }
                RequestTokenError::Request(e) => {
                    Error::Network(format!("Token endpoint unreachable: {}", e))
                }
                other => Error::Network(format!("Unexpected token endpoint reply: {}", other)),
            })?;

        Ok(record_from_response(&response, Some(refresh_token), now))
    }
}

fn record_from_response(
    response: &BasicTokenResponse,
    previous_refresh: Option<&Secret>,
    now: DateTime<Utc>,
) -> CredentialRecord {
    let refresh_token = response
        .refresh_token()
        .map(|t| Secret::new(t.secret().clone()))
        .or_else(|| previous_refresh.cloned());

    // A lifetime past the representable range is treated as no expiry.
    let expiry = response
        .expires_in()
        .and_then(|expires_in| Duration::from_std(expires_in).ok())
        .and_then(|lifetime| now.checked_add_signed(lifetime));

    let token_type = match response.token_type() {
        BasicTokenType::Bearer => "Bearer".to_string(),
        BasicTokenType::Mac => "MAC".to_string(),
        BasicTokenType::Extension(other) => other.clone(),
    };

    CredentialRecord {
        access_token: Secret::new(response.access_token().secret().clone()),
        token_type,
        refresh_token,
        expiry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ClientConfig {
        ClientConfig::new(
            "test_id",
            "test_secret",
            "https://accounts.google.com/o/oauth2/auth",
            "https://oauth2.googleapis.com/token",
        )
        .with_scopes(["https://www.googleapis.com/auth/drive"])
    }

    #[test]
    fn test_authorization_url_generation() {
        let client = OAuthClient::new(&test_config()).unwrap();
        let (url, state) = client.authorization_url();

        assert!(url.contains("accounts.google.com"));
        assert!(url.contains("client_id=test_id"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("scope="));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains(&format!("state={}", state)));
        assert!(!state.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_lifetime_means_no_expiry() {
        let mut server = mockito::Server::new_async().await;
        let _token = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"a1","token_type":"Bearer","expires_in":1000000000000000}"#)
            .create_async()
            .await;

        let config = ClientConfig::new(
            "c1",
            "s1",
            format!("{}/auth", server.url()),
            format!("{}/token", server.url()),
        );
        let client = OAuthClient::new(&config).unwrap();
        let record = client.exchange_code("code", Utc::now()).await.unwrap();

        assert_eq!(record.access_token.expose(), "a1");
        assert_eq!(record.expiry, None);
    }

    #[tokio::test]
    async fn test_refresh_server_error_is_network() {
        let mut server = mockito::Server::new_async().await;
        let _token = server
            .mock("POST", "/token")
            .with_status(503)
            .with_body("Service Unavailable")
            .create_async()
            .await;

        let config = ClientConfig::new(
            "c1",
            "s1",
            format!("{}/auth", server.url()),
            format!("{}/token", server.url()),
        );
        let client = OAuthClient::new(&config).unwrap();
        let result = client.refresh(&Secret::new("r1"), Utc::now()).await;

        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[test]
    fn test_invalid_token_url() {
        let config = ClientConfig::new("id", "secret", "https://example.com/auth", "not a url");
        assert!(matches!(
            OAuthClient::new(&config),
            Err(Error::Configuration(_))
        ));
    }
}
