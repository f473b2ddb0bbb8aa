//! Interactive out-of-band authorization flow.
//!
//! The user opens the consent URL, approves access and pastes back the
//! one-time code. How the URL is shown and the code collected is up to the
//! injected [`ConsentCodeProvider`].

use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

use drivekit_common::{Error, Result};

use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::oauth::OAuthClient;
use crate::token::CredentialRecord;

/// Where the flow currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    /// Consent URL not yet presented.
    AwaitingConsent,
    /// URL presented, waiting for the user to supply the code.
    AwaitingCode,
    /// Code received, talking to the token endpoint.
    Exchanging,
    /// A credential was issued.
    Issued,
    /// The flow aborted.
    Failed,
}

impl FlowState {
    /// Whether the flow has finished, successfully or not.
    pub fn is_terminal(self) -> bool {
        matches!(self, FlowState::Issued | FlowState::Failed)
    }
}

/// Presents the consent URL and returns the authorization code.
#[async_trait]
pub trait ConsentCodeProvider: Send + Sync {
    /// Show `authorization_url` to the user and wait for the code.
    async fn request_code(&self, authorization_url: &str) -> Result<String>;
}

/// Prints the URL to stderr and reads the code from stdin.
///
/// Blocks with no timeout until a line arrives, so it cannot run unattended.
#[derive(Debug, Clone, Default)]
pub struct ConsoleCodeProvider {
    open_browser: bool,
}

impl ConsoleCodeProvider {
    /// Create a console provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also try to open the URL in the default browser.
    pub fn with_browser(mut self, open_browser: bool) -> Self {
        self.open_browser = open_browser;
        self
    }
}

#[async_trait]
impl ConsentCodeProvider for ConsoleCodeProvider {
    async fn request_code(&self, authorization_url: &str) -> Result<String> {
        eprintln!(
            "Go to the following link in your browser then type the authorization code:\n{}\n",
            authorization_url
        );

        if self.open_browser {
            if let Err(e) = open::that(authorization_url) {
                warn!("Could not open browser: {}", e);
            }
        }

        eprintln!("Paste authorization code here:");
        let mut line = String::new();
        let read = BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(|e| {
                Error::AuthorizationFailed(format!("Unable to read authorization code: {}", e))
            })?;

        if read == 0 {
            return Err(Error::AuthorizationFailed(
                "Input closed before an authorization code was entered".to_string(),
            ));
        }

        Ok(line)
    }
}

/// Returns a code supplied up front, e.g. on the command line.
#[derive(Debug, Clone)]
pub struct StaticCodeProvider {
    code: String,
}

impl StaticCodeProvider {
    /// Create a provider that always answers with `code`.
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

#[async_trait]
impl ConsentCodeProvider for StaticCodeProvider {
    async fn request_code(&self, authorization_url: &str) -> Result<String> {
        debug!("Using pre-supplied authorization code for {}", authorization_url);
        Ok(self.code.clone())
    }
}

/// Drives one consent round trip to an issued [`CredentialRecord`].
pub struct AuthorizationFlow {
    provider: Arc<dyn ConsentCodeProvider>,
    clock: Arc<dyn Clock>,
    state: FlowState,
}

impl AuthorizationFlow {
    /// Create a flow using the system clock.
    pub fn new(provider: Arc<dyn ConsentCodeProvider>) -> Self {
        Self::with_clock(provider, Arc::new(SystemClock))
    }

    /// Create a flow with an explicit time source.
    pub fn with_clock(provider: Arc<dyn ConsentCodeProvider>, clock: Arc<dyn Clock>) -> Self {
        Self {
            provider,
            clock,
            state: FlowState::AwaitingConsent,
        }
    }

    /// Current state.
    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Run the flow.
    ///
    /// There is no retry: the code is single-use, so any failure ends this
    /// invocation in [`FlowState::Failed`].
    ///
    /// # Errors
    /// - `Error::Configuration` if the client configuration is unusable
    /// - `Error::AuthorizationFailed` if no code was obtained or the exchange failed
    pub async fn run(&mut self, config: &ClientConfig) -> Result<CredentialRecord> {
        match self.drive(config).await {
            Ok(record) => {
                self.transition(FlowState::Issued);
                Ok(record)
            }
            Err(e) => {
                self.transition(FlowState::Failed);
                error!("Authorization flow failed: {}", e);
                Err(e)
            }
        }
    }

    async fn drive(&mut self, config: &ClientConfig) -> Result<CredentialRecord> {
        if self.state != FlowState::AwaitingConsent {
            return Err(Error::AuthorizationFailed(format!(
                "Flow already ran (state {:?})",
                self.state
            )));
        }

        let client = OAuthClient::new(config)?;
        let (url, _state) = client.authorization_url();

        self.transition(FlowState::AwaitingCode);
        let code = self.provider.request_code(&url).await?;
        let code = code.trim();
        if code.is_empty() {
            return Err(Error::AuthorizationFailed(
                "Empty authorization code".to_string(),
            ));
        }

        self.transition(FlowState::Exchanging);
        let record = client.exchange_code(code, self.clock.now()).await?;

        if !record.can_refresh() {
            warn!("Token endpoint issued no refresh token; re-authorization will be needed on expiry");
        }

        Ok(record)
    }

    fn transition(&mut self, next: FlowState) {
        info!("Authorization flow: {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
