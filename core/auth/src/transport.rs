//! HTTP client bound to a credential that renews itself on demand.

use reqwest::header::{HeaderValue, AUTHORIZATION};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use drivekit_common::{Error, Result};

use crate::clock::Clock;
use crate::config::ClientConfig;
use crate::oauth::OAuthClient;
use crate::store::TokenStore;
use crate::token::CredentialRecord;

struct Inner {
    http: reqwest::Client,
    oauth: OAuthClient,
    store: TokenStore,
    clock: Arc<dyn Clock>,
    record: RwLock<CredentialRecord>,
}

/// Authenticated transport handed to API clients.
///
/// Cloning is cheap and clones share the same credential, so a refresh made
/// through one clone is seen by all of them.
#[derive(Clone)]
pub struct AuthorizedTransport {
    inner: Arc<Inner>,
}

impl AuthorizedTransport {
    /// Bind `record` to a new HTTP client.
    ///
    /// # Errors
    /// - `Error::Configuration` if the client configuration is unusable
    /// - `Error::Network` if the HTTP client cannot be built
    pub fn new(
        config: &ClientConfig,
        record: CredentialRecord,
        store: TokenStore,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let oauth = OAuthClient::new(config)?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("drivekit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                oauth,
                store,
                clock,
                record: RwLock::new(record),
            }),
        })
    }

    /// Underlying client, for building requests to pass to [`execute`](Self::execute).
    pub fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    /// Snapshot of the current credential.
    pub async fn credential(&self) -> CredentialRecord {
        self.inner.record.read().await.clone()
    }

    /// Whether two transports share one credential.
    pub fn shares_credential_with(&self, other: &AuthorizedTransport) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Get a valid `Authorization` header value, refreshing if necessary.
    ///
    /// # Errors
    /// - `Error::AuthExpired` if the token is expired and cannot be renewed
    /// - `Error::Network` if the token endpoint cannot be reached
    /// - `Error::Persistence` if the renewed credential cannot be saved
    pub async fn authorization_header(&self) -> Result<String> {
        let record = self.inner.record.read().await;
        let now = self.inner.clock.now();

        if !record.is_expired(now) {
            return Ok(record.authorization_header());
        }

        drop(record);

        let mut record = self.inner.record.write().await;

        // Double-check after acquiring write lock
        let now = self.inner.clock.now();
        if !record.is_expired(now) {
            return Ok(record.authorization_header());
        }

        let refresh_token = match record.refresh_token.as_ref() {
            Some(token) if !token.is_empty() => token.clone(),
            _ => {
                return Err(Error::AuthExpired(
                    "Access token expired and no refresh token is stored".to_string(),
                ))
            }
        };

        info!("Refreshing expired access token");
        let renewed = self.inner.oauth.refresh(&refresh_token, now).await?;
        *record = renewed;

        self.inner.store.save(&record)?;
        debug!(expiry = ?record.expiry, "Access token refreshed");

        Ok(record.authorization_header())
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn access_token(&self) -> Result<String> {
        self.authorization_header().await?;
        Ok(self.inner.record.read().await.access_token.expose().to_string())
    }

    /// Send `request` with a valid access token.
    ///
    /// An expired token is refreshed and persisted before the request goes
    /// out. Transport errors from the request itself are returned as
    /// `Error::Network`; the response status is not inspected.
    ///
    /// # Errors
    /// - `Error::AuthExpired` if the token could not be renewed
    /// - `Error::Network` if the token endpoint or the request target cannot be reached
    /// - `Error::Persistence` if the renewed credential could not be saved
    pub async fn execute(&self, mut request: reqwest::Request) -> Result<reqwest::Response> {
        let header = self.authorization_header().await?;
        let mut value = HeaderValue::from_str(&header)
            .map_err(|e| Error::InvalidInput(format!("Invalid access token: {}", e)))?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);

        debug!(method = %request.method(), url = %request.url(), "Dispatching request");

        self.inner
            .http
            .execute(request)
            .await
            .map_err(|e| Error::Network(format!("Request failed: {}", e)))
    }
}
