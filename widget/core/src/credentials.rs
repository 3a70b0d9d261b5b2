//! Credential Store
//!
//! Owns the identity/authorization tokens handed over by the parent page and
//! the handle to the temporary-credentials provider.
//!
//! # Design Philosophy
//!
//! Credentials are immutable once built. The store holds an `Arc` to the
//! current set and swaps it wholesale, so a reader holding a snapshot never
//! sees a mix of old and new fields. There is no refresh or retry logic
//! here: keeping provider credentials fresh is the identity provider's job.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity, access and refresh tokens
///
/// Serialized with the field names the parent page uses.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    /// Identity token (JWT); empty means unauthenticated
    #[serde(rename = "idtokenjwt", default)]
    pub id_token: String,
    /// Access token (JWT)
    #[serde(rename = "accesstokenjwt", default)]
    pub access_token: String,
    /// Refresh token
    #[serde(rename = "refreshtoken", default)]
    pub refresh_token: String,
}

impl AuthTokens {
    /// Tokens carrying only an identity token
    pub fn with_id_token(token: impl Into<String>) -> Self {
        Self {
            id_token: token.into(),
            ..Default::default()
        }
    }

    /// Whether an identity token is present
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        !self.id_token.is_empty()
    }
}

impl fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthTokens")
            .field("id_token", &redact(&self.id_token))
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .finish()
    }
}

/// Temporary provider credentials (access key style)
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCredentials {
    /// Access key identifier
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Session token
    #[serde(default)]
    pub session_token: Option<String>,
    /// Identity the credentials were issued for
    #[serde(default)]
    pub identity_id: Option<String>,
    /// Expiration as sent by the identity provider
    #[serde(default, alias = "expireTime")]
    pub expiration: Option<String>,
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("identity_id", &self.identity_id)
            .field("expiration", &self.expiration)
            .finish()
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

/// Errors from a credentials provider
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// No provider is configured
    #[error("No credentials provider configured")]
    NoProvider,

    /// The provider could not supply credentials
    #[error("Credentials unavailable: {0}")]
    Unavailable(String),
}

/// Source of temporary provider credentials
///
/// Implemented by the identity provider client; the store only holds the
/// handle.
#[async_trait]
pub trait CredentialsProvider: Send + Sync + fmt::Debug {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Current credentials, refreshing if the provider needs to
    async fn credentials(&self) -> Result<ProviderCredentials, CredentialError>;
}

/// Provider returning a fixed set of credentials
///
/// Built from a `replaceCreds` payload.
#[derive(Debug, Clone)]
pub struct StaticCredentialsProvider {
    creds: ProviderCredentials,
}

impl StaticCredentialsProvider {
    /// Wrap fixed credentials
    #[must_use]
    pub fn new(creds: ProviderCredentials) -> Self {
        Self { creds }
    }
}

#[async_trait]
impl CredentialsProvider for StaticCredentialsProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn credentials(&self) -> Result<ProviderCredentials, CredentialError> {
        Ok(self.creds.clone())
    }
}

/// One immutable set of credentials
#[derive(Clone, Debug, Default)]
pub struct Credentials {
    /// Parent-supplied tokens
    pub tokens: AuthTokens,
    /// Temporary-credentials provider handle
    pub provider: Option<Arc<dyn CredentialsProvider>>,
}

impl Credentials {
    /// Whether these credentials identify a logged-in user
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.tokens.is_authenticated()
    }
}

/// Holder of the current credentials
#[derive(Debug)]
pub struct CredentialStore {
    current: RwLock<Arc<Credentials>>,
    defaults: Arc<Credentials>,
    generation: AtomicU64,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new(None)
    }
}

impl CredentialStore {
    /// Create a store whose unauthenticated default uses `default_provider`
    #[must_use]
    pub fn new(default_provider: Option<Arc<dyn CredentialsProvider>>) -> Self {
        let defaults = Arc::new(Credentials {
            tokens: AuthTokens::default(),
            provider: default_provider,
        });
        Self {
            current: RwLock::new(Arc::clone(&defaults)),
            defaults,
            generation: AtomicU64::new(0),
        }
    }

    /// The current credentials
    #[must_use]
    pub fn snapshot(&self) -> Arc<Credentials> {
        Arc::clone(&self.current.read())
    }

    /// Swap in a complete new set of credentials
    pub fn replace(&self, creds: Credentials) {
        self.swap(Arc::new(creds));
        tracing::debug!(generation = self.generation(), "Credentials replaced");
    }

    /// Replace the tokens, keeping the current provider
    pub fn replace_tokens(&self, tokens: AuthTokens) {
        let mut current = self.current.write();
        let next = Credentials {
            tokens,
            provider: current.provider.clone(),
        };
        *current = Arc::new(next);
        self.generation.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Credential tokens replaced");
    }

    /// Replace the provider handle, keeping the current tokens
    pub fn replace_provider(&self, provider: Arc<dyn CredentialsProvider>) {
        let mut current = self.current.write();
        tracing::debug!(provider = provider.name(), "Credentials provider replaced");
        let next = Credentials {
            tokens: current.tokens.clone(),
            provider: Some(provider),
        };
        *current = Arc::new(next);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Reset to the unauthenticated defaults
    pub fn clear(&self) {
        self.swap(Arc::clone(&self.defaults));
        tracing::debug!("Credentials cleared");
    }

    /// Whether the identity token is non-empty
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.current.read().is_authenticated()
    }

    /// Whether the store holds exactly the cleared defaults
    #[must_use]
    pub fn is_cleared(&self) -> bool {
        Arc::ptr_eq(&self.current.read(), &self.defaults)
    }

    /// Number of swaps so far
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Fetch provider credentials from the current provider
    ///
    /// The lock is released before the provider is awaited.
    pub async fn provider_credentials(&self) -> Result<ProviderCredentials, CredentialError> {
        let provider = self
            .snapshot()
            .provider
            .clone()
            .ok_or(CredentialError::NoProvider)?;
        provider.credentials().await
    }

    fn swap(&self, next: Arc<Credentials>) {
        *self.current.write() = next;
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}
