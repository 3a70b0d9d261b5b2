//! Conversation Orchestrator
//!
//! Drives dialog turns end to end: admission, transcript, the backend call,
//! and the state update when the reply (or the failure) arrives.
//!
//! # Design Philosophy
//!
//! `submit_turn` is synchronous. It admits the turn through
//! [`SessionMachine::begin_turn`], which is the single admission-control
//! point, spawns the backend call and returns. The reply comes back as an
//! [`OrchestratorEvent`] on the completion channel, and the owner feeds it to
//! [`ConversationOrchestrator::handle_event`]. No state is touched from the
//! spawned task, so transitions never interleave with a network call.
//!
//! Every admitted turn produces exactly one completion, even if the backend
//! task panics, so the machine can never stay `PROCESSING`.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::backend::{BackendError, DialogBackend, LiveChatAgent, TurnKind, TurnReply, TurnRequest};
use crate::messages::MessageId;
use crate::session::{ChatMode, LiveChatStatus, SessionError, SessionMachine, TurnResult};
use crate::transcript::{EntryKind, Transcript, TranscriptEntry};

/// Transcript text for a failed turn when error details are hidden
pub const GENERIC_ERROR_TEXT: &str = "Sorry, I was unable to process your message. Please try again.";

/// Why a turn was not submitted
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TurnError {
    /// Session refused the transition (a turn is already processing)
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Nothing to send
    #[error("Input is empty")]
    EmptyInput,

    /// Live chat mode but no agent connected yet (or anymore)
    #[error("Live chat is {0}")]
    LiveChatNotConnected(LiveChatStatus),

    /// Live chat connected but no agent collaborator configured
    #[error("No live chat agent configured")]
    NoLiveChatAgent,
}

/// What happened to accepted input
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A dialog turn is in flight
    TurnStarted(u64),
    /// The text was forwarded to the live agent
    ForwardedToAgent,
}

/// Results of background work, fed back through `handle_event`
#[derive(Debug)]
pub enum OrchestratorEvent {
    /// The backend call of a turn finished
    TurnCompleted {
        /// Turn this reply belongs to
        turn_id: u64,
        /// Reply or failure
        outcome: Result<TurnReply, BackendError>,
    },
    /// Forwarding a message to the live agent failed
    LiveChatSendFailed(BackendError),
}

/// Turn driver for one widget
pub struct ConversationOrchestrator<B: DialogBackend + 'static> {
    backend: Arc<B>,
    live_chat: Option<Arc<dyn LiveChatAgent>>,
    transcript: Transcript,
    completions: mpsc::UnboundedSender<OrchestratorEvent>,
    next_turn_id: u64,
    in_flight: Option<u64>,
    locale: Option<String>,
    show_error_details: bool,
}

impl<B: DialogBackend + 'static> ConversationOrchestrator<B> {
    /// Create an orchestrator and the receiver for its completions
    pub fn new(
        backend: B,
        transcript: Transcript,
    ) -> (Self, mpsc::UnboundedReceiver<OrchestratorEvent>) {
        let (completions, rx) = mpsc::unbounded_channel();
        let orchestrator = Self {
            backend: Arc::new(backend),
            live_chat: None,
            transcript,
            completions,
            next_turn_id: 1,
            in_flight: None,
            locale: None,
            show_error_details: false,
        };
        (orchestrator, rx)
    }

    /// Attach the live-agent collaborator
    #[must_use]
    pub fn with_live_chat(mut self, agent: Arc<dyn LiveChatAgent>) -> Self {
        self.live_chat = Some(agent);
        self
    }

    /// Put backend error text into the transcript instead of a generic notice
    #[must_use]
    pub fn with_error_details(mut self, show: bool) -> Self {
        self.show_error_details = show;
        self
    }

    /// Locale sent with every turn
    pub fn set_locale(&mut self, locale: Option<String>) {
        self.locale = locale;
    }

    /// The dialog backend
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Conversation transcript
    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Whether a backend call is outstanding
    #[must_use]
    pub fn is_turn_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Submit user input
    ///
    /// In live-chat mode, human text goes to the agent instead of the
    /// backend. Otherwise the turn is admitted by the session machine and
    /// the backend call is spawned.
    pub fn submit_turn(
        &mut self,
        session: &mut SessionMachine,
        input: &str,
        kind: TurnKind,
    ) -> Result<SubmitOutcome, TurnError> {
        let text = input.trim();
        if text.is_empty() {
            return Err(TurnError::EmptyInput);
        }

        if kind == TurnKind::Human && session.session().chat_mode == ChatMode::LiveChat {
            return self.forward_to_agent(session, text);
        }

        session.begin_turn()?;

        if kind == TurnKind::Human {
            session.push_utterance(text);
        }
        self.transcript.push_text(entry_kind(kind), text);

        let turn_id = self.next_turn_id;
        self.next_turn_id += 1;
        self.in_flight = Some(turn_id);

        let request = TurnRequest {
            text: text.to_string(),
            kind,
            session_attributes: session.session().session_attributes.clone(),
            locale: self.locale.clone(),
        };
        tracing::debug!(turn_id, kind = %kind, backend = self.backend.name(), "Turn submitted");

        let backend = Arc::clone(&self.backend);
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let call = tokio::spawn(async move { backend.send_turn(request).await });
            let outcome = match call.await {
                Ok(outcome) => outcome,
                Err(e) => Err(BackendError::Backend(format!("Turn task failed: {e}"))),
            };
            if completions
                .send(OrchestratorEvent::TurnCompleted { turn_id, outcome })
                .is_err()
            {
                tracing::debug!(turn_id, "Turn completed after the orchestrator was dropped");
            }
        });

        Ok(SubmitOutcome::TurnStarted(turn_id))
    }

    /// Apply a completion from the receiver returned by `new`
    pub fn handle_event(&mut self, session: &mut SessionMachine, event: OrchestratorEvent) {
        match event {
            OrchestratorEvent::TurnCompleted { turn_id, outcome } => {
                self.complete_turn(session, turn_id, outcome);
            }
            OrchestratorEvent::LiveChatSendFailed(e) => {
                tracing::warn!(error = %e, "Failed to forward message to live agent");
                let text = self.error_text(&e);
                self.transcript.push_text(EntryKind::Error, text);
            }
        }
    }

    /// End a turn with the backend's outcome
    ///
    /// Success merges the reply's attributes and dialog state; failure ends
    /// the turn with nothing merged and appends an error entry.
    pub fn complete_turn(
        &mut self,
        session: &mut SessionMachine,
        turn_id: u64,
        outcome: Result<TurnReply, BackendError>,
    ) -> Option<MessageId> {
        if self.in_flight != Some(turn_id) {
            tracing::warn!(turn_id, in_flight = ?self.in_flight, "Ignoring completion of unknown turn");
            return None;
        }
        self.in_flight = None;

        match outcome {
            Ok(reply) => {
                let entry = (!reply.reply_text.is_empty()).then(|| {
                    self.transcript
                        .push(TranscriptEntry::bot(reply.reply_text, reply.dialog_state.clone()))
                });
                session.end_turn(TurnResult {
                    attributes: reply.new_session_attributes,
                    dialog_state: reply.dialog_state,
                });
                tracing::debug!(turn_id, "Turn completed");
                entry
            }
            Err(e) => {
                tracing::error!(turn_id, error = %e, "Dialog turn failed");
                let text = self.error_text(&e);
                let id = self.transcript.push_text(EntryKind::Error, text);
                session.end_turn(TurnResult::empty());
                Some(id)
            }
        }
    }

    /// A live agent sent a message
    pub fn agent_message(&mut self, text: impl Into<String>) -> MessageId {
        self.transcript.push_text(EntryKind::Agent, text)
    }

    /// Informational transcript entry
    pub fn notice(&mut self, text: impl Into<String>) -> MessageId {
        self.transcript.push_text(EntryKind::System, text)
    }

    /// Clear transcript and utterance history
    pub fn reset_history(&mut self, session: &mut SessionMachine) {
        self.transcript.clear();
        session.reset_history();
    }

    fn forward_to_agent(
        &mut self,
        session: &SessionMachine,
        text: &str,
    ) -> Result<SubmitOutcome, TurnError> {
        let status = session.session().live_chat_status;
        if status != LiveChatStatus::Connected {
            return Err(TurnError::LiveChatNotConnected(status));
        }
        let agent = self.live_chat.clone().ok_or(TurnError::NoLiveChatAgent)?;

        self.transcript.push_text(EntryKind::Human, text);
        let completions = self.completions.clone();
        let text = text.to_string();
        tokio::spawn(async move {
            if let Err(e) = agent.send_message(&text).await {
                if completions
                    .send(OrchestratorEvent::LiveChatSendFailed(e))
                    .is_err()
                {
                    tracing::debug!("Live chat send failed after the orchestrator was dropped");
                }
            }
        });
        Ok(SubmitOutcome::ForwardedToAgent)
    }

    fn error_text(&self, error: &BackendError) -> String {
        if self.show_error_details {
            format!("There was an error processing your request: {error}")
        } else {
            GENERIC_ERROR_TEXT.to_string()
        }
    }
}

fn entry_kind(kind: TurnKind) -> EntryKind {
    match kind {
        TurnKind::Human => EntryKind::Human,
        TurnKind::Button => EntryKind::Button,
        TurnKind::Feedback => EntryKind::Feedback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DialogState;
    use crate::session::TurnStatus;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct MockBackend {
        fail: bool,
    }

    #[async_trait]
    impl DialogBackend for MockBackend {
        fn name(&self) -> &str {
            "Mock"
        }

        async fn send_turn(&self, request: TurnRequest) -> Result<TurnReply, BackendError> {
            if self.fail {
                return Err(BackendError::Network("connection reset".to_string()));
            }
            let mut attributes = BTreeMap::new();
            attributes.insert("lastInput".to_string(), request.text.clone());
            Ok(TurnReply {
                reply_text: format!("You said {}", request.text),
                new_session_attributes: attributes,
                dialog_state: Some(DialogState::Fulfilled),
            })
        }
    }

    struct PanickingBackend;

    #[async_trait]
    impl DialogBackend for PanickingBackend {
        fn name(&self) -> &str {
            "Panicking"
        }

        async fn send_turn(&self, _request: TurnRequest) -> Result<TurnReply, BackendError> {
            panic!("backend bug");
        }
    }

    struct UnreachableAgent;

    #[async_trait]
    impl LiveChatAgent for UnreachableAgent {
        async fn send_message(&self, _text: &str) -> Result<(), BackendError> {
            Err(BackendError::Network("agent unreachable".to_string()))
        }
    }

    async fn drain<B: DialogBackend + 'static>(
        orchestrator: &mut ConversationOrchestrator<B>,
        session: &mut SessionMachine,
        rx: &mut UnboundedReceiver<OrchestratorEvent>,
    ) {
        let event = rx.recv().await.unwrap();
        orchestrator.handle_event(session, event);
    }

    #[tokio::test]
    async fn test_successful_turn() {
        let (mut orchestrator, mut rx) =
            ConversationOrchestrator::new(MockBackend { fail: false }, Transcript::new());
        let mut session = SessionMachine::new();

        let outcome = orchestrator
            .submit_turn(&mut session, "  hello ", TurnKind::Human)
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::TurnStarted(1));
        assert_eq!(session.session().turn_status, TurnStatus::Processing);
        assert_eq!(session.session().utterance_history, vec!["hello"]);

        drain(&mut orchestrator, &mut session, &mut rx).await;

        let state = session.session();
        assert_eq!(state.turn_status, TurnStatus::Idle);
        assert_eq!(state.session_attributes["lastInput"], "hello");
        assert_eq!(state.dialog_state, Some(DialogState::Fulfilled));
        let texts: Vec<_> = orchestrator
            .transcript()
            .entries()
            .iter()
            .map(|e| (e.kind, e.text.as_str()))
            .collect();
        assert_eq!(
            texts,
            vec![(EntryKind::Human, "hello"), (EntryKind::Bot, "You said hello")]
        );
    }

    #[tokio::test]
    async fn test_second_submit_while_processing_rejected() {
        let (mut orchestrator, _rx) =
            ConversationOrchestrator::new(MockBackend { fail: false }, Transcript::new());
        let mut session = SessionMachine::new();

        orchestrator
            .submit_turn(&mut session, "first", TurnKind::Human)
            .unwrap();
        let before = session.session().clone();

        assert_eq!(
            orchestrator.submit_turn(&mut session, "hello", TurnKind::Human),
            Err(TurnError::Session(SessionError::AlreadyProcessing))
        );
        assert_eq!(session.session(), &before);
        assert_eq!(orchestrator.transcript().len(), 1);
    }

    #[tokio::test]
    async fn test_network_failure_returns_to_idle() {
        let (mut orchestrator, mut rx) =
            ConversationOrchestrator::new(MockBackend { fail: true }, Transcript::new());
        let mut session = SessionMachine::new();
        session.set_attribute("topic", "billing");
        let attributes_before = session.session().session_attributes.clone();

        orchestrator
            .submit_turn(&mut session, "hello", TurnKind::Human)
            .unwrap();
        drain(&mut orchestrator, &mut session, &mut rx).await;

        assert_eq!(session.session().turn_status, TurnStatus::Idle);
        assert_eq!(session.session().session_attributes, attributes_before);
        let last = orchestrator.transcript().last().unwrap();
        assert_eq!(last.kind, EntryKind::Error);
        assert_eq!(last.text, GENERIC_ERROR_TEXT);
        assert!(!orchestrator.is_turn_in_flight());
    }

    #[tokio::test]
    async fn test_error_details_shown_when_enabled() {
        let (orchestrator, mut rx) =
            ConversationOrchestrator::new(MockBackend { fail: true }, Transcript::new());
        let mut orchestrator = orchestrator.with_error_details(true);
        let mut session = SessionMachine::new();

        orchestrator
            .submit_turn(&mut session, "hello", TurnKind::Human)
            .unwrap();
        drain(&mut orchestrator, &mut session, &mut rx).await;

        let last = orchestrator.transcript().last().unwrap();
        assert!(last.text.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_panicking_backend_still_completes() {
        let (mut orchestrator, mut rx) =
            ConversationOrchestrator::new(PanickingBackend, Transcript::new());
        let mut session = SessionMachine::new();

        orchestrator
            .submit_turn(&mut session, "hello", TurnKind::Human)
            .unwrap();
        drain(&mut orchestrator, &mut session, &mut rx).await;

        assert_eq!(session.session().turn_status, TurnStatus::Idle);
        assert_eq!(orchestrator.transcript().last().unwrap().kind, EntryKind::Error);
    }

    #[tokio::test]
    async fn test_button_and_feedback_not_in_history() {
        let (mut orchestrator, mut rx) =
            ConversationOrchestrator::new(MockBackend { fail: false }, Transcript::new());
        let mut session = SessionMachine::new();

        orchestrator
            .submit_turn(&mut session, "Option 1", TurnKind::Button)
            .unwrap();
        drain(&mut orchestrator, &mut session, &mut rx).await;
        orchestrator
            .submit_turn(&mut session, "Thumbs up", TurnKind::Feedback)
            .unwrap();
        drain(&mut orchestrator, &mut session, &mut rx).await;

        assert!(session.session().utterance_history.is_empty());
        assert_eq!(orchestrator.transcript().entries()[0].kind, EntryKind::Button);
        assert_eq!(orchestrator.transcript().entries()[2].kind, EntryKind::Feedback);
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let (mut orchestrator, _rx) =
            ConversationOrchestrator::new(MockBackend { fail: false }, Transcript::new());
        let mut session = SessionMachine::new();
        assert_eq!(
            orchestrator.submit_turn(&mut session, "   ", TurnKind::Human),
            Err(TurnError::EmptyInput)
        );
        assert_eq!(session.session().turn_status, TurnStatus::Idle);
    }

    #[tokio::test]
    async fn test_stale_completion_ignored() {
        let (mut orchestrator, _rx) =
            ConversationOrchestrator::new(MockBackend { fail: false }, Transcript::new());
        let mut session = SessionMachine::new();

        assert_eq!(
            orchestrator.complete_turn(&mut session, 42, Ok(TurnReply::default())),
            None
        );
        assert!(orchestrator.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_live_chat_requires_connection() {
        let (mut orchestrator, _rx) =
            ConversationOrchestrator::new(MockBackend { fail: false }, Transcript::new());
        let mut session = SessionMachine::new();
        session.enter_live_chat().unwrap();
        assert_eq!(session.session().chat_mode, ChatMode::LiveChat);

        assert_eq!(
            orchestrator.submit_turn(&mut session, "hello agent", TurnKind::Human),
            Err(TurnError::LiveChatNotConnected(LiveChatStatus::Connecting))
        );

        session.live_chat_established().unwrap();
        assert_eq!(
            orchestrator.submit_turn(&mut session, "hello agent", TurnKind::Human),
            Err(TurnError::NoLiveChatAgent)
        );
        assert_eq!(session.session().turn_status, TurnStatus::Idle);
    }

    #[tokio::test]
    async fn test_live_chat_forward_failure_reported() {
        let (orchestrator, mut rx) =
            ConversationOrchestrator::new(MockBackend { fail: false }, Transcript::new());
        let mut orchestrator = orchestrator.with_live_chat(Arc::new(UnreachableAgent));
        let mut session = SessionMachine::new();
        session.enter_live_chat().unwrap();
        session.live_chat_established().unwrap();

        assert_eq!(
            orchestrator.submit_turn(&mut session, "hello agent", TurnKind::Human),
            Ok(SubmitOutcome::ForwardedToAgent)
        );
        drain(&mut orchestrator, &mut session, &mut rx).await;

        let last = orchestrator.transcript().last().unwrap();
        assert_eq!(last.kind, EntryKind::Error);
        assert_eq!(last.text, GENERIC_ERROR_TEXT);
        assert_eq!(session.session().turn_status, TurnStatus::Idle);
    }

    #[tokio::test]
    async fn test_reset_history() {
        let (mut orchestrator, mut rx) =
            ConversationOrchestrator::new(MockBackend { fail: false }, Transcript::new());
        let mut session = SessionMachine::new();
        orchestrator
            .submit_turn(&mut session, "hello", TurnKind::Human)
            .unwrap();
        drain(&mut orchestrator, &mut session, &mut rx).await;

        orchestrator.reset_history(&mut session);
        assert!(orchestrator.transcript().is_empty());
        assert!(session.session().utterance_history.is_empty());
    }
}
