//! Credential lifecycle: cached token, consent flow fallback, transport.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use drivekit_common::{Error, Result};

use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::flow::{AuthorizationFlow, ConsentCodeProvider};
use crate::store::TokenStore;
use crate::token::CredentialRecord;
use crate::transport::AuthorizedTransport;

/// Produces [`AuthorizedTransport`]s backed by a cached credential.
///
/// The first call loads the token file, or runs the consent flow and saves
/// its result when there is no usable file. Later calls in the same process
/// return the same transport.
pub struct CredentialManager {
    store: TokenStore,
    provider: Arc<dyn ConsentCodeProvider>,
    clock: Arc<dyn Clock>,
    transport: Mutex<Option<AuthorizedTransport>>,
}

impl CredentialManager {
    /// Create a manager using the system clock.
    pub fn new(store: TokenStore, provider: Arc<dyn ConsentCodeProvider>) -> Self {
        Self {
            store,
            provider,
            clock: Arc::new(SystemClock),
            transport: Mutex::new(None),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The token store backing this manager.
    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Get a transport bound to a usable credential.
    ///
    /// # Postconditions
    /// - A credential obtained from the consent flow has been persisted
    ///
    /// # Errors
    /// - `Error::AuthorizationFailed` if the consent flow fails
    /// - `Error::Persistence` if the new credential cannot be saved
    /// - `Error::Configuration` if `config` is unusable
    pub async fn get_transport(&self, config: &ClientConfig) -> Result<AuthorizedTransport> {
        let mut cached = self.transport.lock().await;
        if let Some(transport) = cached.as_ref() {
            debug!("Reusing in-process credential");
            return Ok(transport.clone());
        }

        let record = match self.store.load() {
            Ok(record) => {
                debug!("Loaded cached credential from {}", self.store.path().display());
                record
            }
            Err(Error::CredentialMissing(reason)) => {
                info!("No usable cached credential ({}), starting authorization", reason);
                self.acquire(config).await?
            }
            Err(e) => return Err(e),
        };

        let transport =
            AuthorizedTransport::new(config, record, self.store.clone(), self.clock.clone())?;
        *cached = Some(transport.clone());
        Ok(transport)
    }

    /// Run the consent flow even if a cached credential exists.
    ///
    /// Replaces both the token file and the in-process transport.
    pub async fn login(&self, config: &ClientConfig) -> Result<AuthorizedTransport> {
        let mut cached = self.transport.lock().await;
        let record = self.acquire(config).await?;

        let transport =
            AuthorizedTransport::new(config, record, self.store.clone(), self.clock.clone())?;
        *cached = Some(transport.clone());
        Ok(transport)
    }

    /// Forget the credential, on disk and in process.
    pub async fn logout(&self) -> Result<()> {
        self.transport.lock().await.take();
        self.store.delete()
    }

    async fn acquire(&self, config: &ClientConfig) -> Result<CredentialRecord> {
        let mut flow = AuthorizationFlow::with_clock(self.provider.clone(), self.clock.clone());
        let record = flow.run(config).await?;
        self.store.save(&record)?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::StaticCodeProvider;
    use chrono::{Duration, Utc};
    use drivekit_common::Secret;
    use tempfile::TempDir;

    fn config_for(server: &mockito::Server) -> ClientConfig {
        ClientConfig::new(
            "c1",
            "s1",
            format!("{}/auth", server.url()),
            format!("{}/token", server.url()),
        )
    }

    #[tokio::test]
    async fn test_cached_credential_skips_flow() {
        let mut server = mockito::Server::new_async().await;
        let token = server.mock("POST", "/token").expect(0).create_async().await;

        let temp = TempDir::new().unwrap();
        let store = TokenStore::new(temp.path().join("token.json"));
        let record = CredentialRecord::new(
            "cached",
            Some(Secret::new("r1")),
            Some(Utc::now() + Duration::hours(1)),
        );
        store.save(&record).unwrap();

        let manager = CredentialManager::new(store, Arc::new(StaticCodeProvider::new("unused")));
        let transport = manager.get_transport(&config_for(&server)).await.unwrap();

        assert_eq!(transport.credential().await, record);
        token.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_flow_persists_nothing() {
        let mut server = mockito::Server::new_async().await;
        let _token = server
            .mock("POST", "/token")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let temp = TempDir::new().unwrap();
        let store = TokenStore::new(temp.path().join("token.json"));
        let manager =
            CredentialManager::new(store.clone(), Arc::new(StaticCodeProvider::new("bad")));

        let result = manager.get_transport(&config_for(&server)).await;

        assert!(matches!(result, Err(Error::AuthorizationFailed(_))));
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_logout_removes_token_file() {
        let server = mockito::Server::new_async().await;
        let temp = TempDir::new().unwrap();
        let store = TokenStore::new(temp.path().join("token.json"));
        store.save(&CredentialRecord::new("a", None, None)).unwrap();

        let manager = CredentialManager::new(store.clone(), Arc::new(StaticCodeProvider::new("x")));
        manager.get_transport(&config_for(&server)).await.unwrap();
        manager.logout().await.unwrap();

        assert!(!store.path().exists());
    }
}
