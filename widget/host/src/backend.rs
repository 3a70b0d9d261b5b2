//! Backend selection for the host
//!
//! With an endpoint configured the host talks HTTP; without one it answers
//! every turn by echoing it, which is enough to exercise the protocol.

use std::sync::Arc;

use async_trait::async_trait;

use widget_core::backend::http::HttpDialogBackend;
use widget_core::{
    BackendError, CredentialStore, DialogBackend, DialogState, TurnReply, TurnRequest,
    WidgetConfig,
};

/// Answers each turn with its own text
#[derive(Debug, Default)]
pub struct EchoBackend;

#[async_trait]
impl DialogBackend for EchoBackend {
    fn name(&self) -> &str {
        "Echo"
    }

    async fn send_turn(&self, request: TurnRequest) -> Result<TurnReply, BackendError> {
        let mut attributes = request.session_attributes;
        attributes.insert("lastInputKind".to_string(), request.kind.to_string());
        Ok(TurnReply {
            reply_text: request.text,
            new_session_attributes: attributes,
            dialog_state: Some(DialogState::Fulfilled),
        })
    }
}

/// The backend the host drives
pub enum HostBackend {
    /// Remote dialog backend
    Http(HttpDialogBackend),
    /// Local echo
    Echo(EchoBackend),
}

impl HostBackend {
    /// Pick the backend for `config`
    pub fn from_config(
        config: &WidgetConfig,
        credentials: &Arc<CredentialStore>,
    ) -> Result<Self, BackendError> {
        match config.backend.endpoint {
            Some(ref endpoint) => {
                let backend = HttpDialogBackend::new(endpoint.as_str(), config.backend.timeout())?
                    .with_credentials(Arc::clone(credentials));
                Ok(Self::Http(backend))
            }
            None => Ok(Self::Echo(EchoBackend)),
        }
    }
}

#[async_trait]
impl DialogBackend for HostBackend {
    fn name(&self) -> &str {
        match self {
            Self::Http(backend) => backend.name(),
            Self::Echo(backend) => backend.name(),
        }
    }

    async fn send_turn(&self, request: TurnRequest) -> Result<TurnReply, BackendError> {
        match self {
            Self::Http(backend) => backend.send_turn(request).await,
            Self::Echo(backend) => backend.send_turn(request).await,
        }
    }
}
