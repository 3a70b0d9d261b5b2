//! HTTP Dialog Backend
//!
//! Reference [`DialogBackend`] that posts each turn as JSON to a single
//! endpoint and expects a [`TurnReply`] body back:
//!
//! ```text
//! POST <endpoint>
//! Authorization: Bearer <identity token>     (when logged in)
//! { "text": "...", "kind": "human", "sessionAttributes": {...}, "locale": "en_US" }
//!
//! 200 { "replyText": "...", "newSessionAttributes": {...}, "dialogState": "ElicitIntent" }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::credentials::CredentialStore;

use super::traits::{BackendError, DialogBackend, TurnReply, TurnRequest};

/// Default request timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// JSON-over-HTTP dialog backend
#[derive(Clone, Debug)]
pub struct HttpDialogBackend {
    endpoint: String,
    http_client: reqwest::Client,
    credentials: Option<Arc<CredentialStore>>,
}

impl HttpDialogBackend {
    /// Create a backend for `endpoint`
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            endpoint: endpoint.into(),
            http_client,
            credentials: None,
        })
    }

    /// Send the identity token from `store` as a bearer token
    #[must_use]
    pub fn with_credentials(mut self, store: Arc<CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    /// Endpoint URL
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn bearer_token(&self) -> Option<String> {
        let snapshot = self.credentials.as_ref()?.snapshot();
        snapshot
            .is_authenticated()
            .then(|| snapshot.tokens.id_token.clone())
    }
}

#[async_trait]
impl DialogBackend for HttpDialogBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn send_turn(&self, request: TurnRequest) -> Result<TurnReply, BackendError> {
        let mut builder = self.http_client.post(&self.endpoint).json(&request);
        if let Some(token) = self.bearer_token() {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Backend(format!(
                "Dialog backend returned {status}: {body}"
            )));
        }

        response
            .json::<TurnReply>()
            .await
            .map_err(|e| BackendError::Backend(format!("Invalid reply body: {e}")))
    }
}
