//! Widget Façade
//!
//! One mounted widget: it owns the session machine, the credential store,
//! the orchestrator, the dispatcher and the widget side of the channel, and
//! drives them from a single loop.
//!
//! # Event Sources
//!
//! ```text
//!   ParentWindow ──► CrossWindowChannel ──┐
//!   WidgetHandle::act ──► UserAction ─────┤
//!   turn completions ─────────────────────┼──► Widget::run ──► SessionMachine
//!   WidgetHandle::audio ──► AudioEvent ───┤
//!   WidgetHandle::live_chat ──► LiveChat ─┘
//! ```
//!
//! Every source is drained by the same task, so inbound events are handled
//! strictly in arrival order and no two handlers interleave. Handlers are
//! synchronous; the loop suspends only between events.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::WatchStream;

use crate::audio::AudioEvent;
use crate::backend::{DialogBackend, LiveChatAgent, TurnKind};
use crate::config::WidgetConfig;
use crate::credentials::CredentialStore;
use crate::dispatcher::{DispatchOutcome, DispatchTargets, ProtocolDispatcher};
use crate::events::InboundEvent;
use crate::locale::{LocaleError, LocaleSelection, LocaleStore, MemoryLocaleStore};
use crate::messages::WidgetMessage;
use crate::orchestrator::{
    ConversationOrchestrator, OrchestratorEvent, SubmitOutcome, TurnError,
};
use crate::session::{LiveChatStatus, Session, SessionError, SessionMachine};
use crate::transcript::Transcript;
use crate::transport::{ChannelError, CrossWindowChannel, OutboundSender, ParentWindow};

/// Session attribute holding the uploaded-file list (JSON-encoded)
pub const ATTACHMENTS_ATTRIBUTE: &str = "userFilesUploaded";

const ACTION_QUEUE: usize = 32;

/// Something the user did in the rendered widget
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "value", rename_all = "camelCase")]
pub enum UserAction {
    /// Typed or transcribed text
    SubmitText(String),
    /// Response-card button
    ButtonClick(String),
    /// Thumbs up/down
    Feedback(String),
    /// Login button
    RequestLogin,
    /// Logout button
    RequestLogout,
    /// Escalate to a live agent
    RequestLiveChat,
    /// Leave the live chat
    EndLiveChat,
    /// Sound effects on/off
    ToggleSfx,
    /// Minimize/restore
    ToggleMinimize,
    /// Switch locale
    SelectLocale(String),
    /// Stop bot speech
    InterruptSpeech,
    /// Drop uploaded files
    ClearAttachments,
    /// Take back the last utterance
    PopUtterance,
    /// Clear transcript and utterance history
    ResetHistory,
    /// Tear the widget down
    Unmount,
}

/// Events from the live-chat collaborator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum LiveChatEvent {
    /// An agent joined
    Established,
    /// The agent wrote something
    AgentMessage(String),
    /// The chat is over
    Ended,
}

/// Uploaded file recorded in session attributes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Display name
    pub file_name: String,
    /// Storage location, when the uploader reported one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_path: Option<String>,
}

/// Why a user action had no effect
#[derive(Debug, Error)]
pub enum WidgetError {
    /// The turn was not submitted
    #[error(transparent)]
    Turn(#[from] TurnError),

    /// The session refused the transition
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Locale selection failed
    #[error(transparent)]
    Locale(#[from] LocaleError),

    /// Posting to the parent failed
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Live chat is disabled in configuration
    #[error("Live chat is not enabled")]
    LiveChatDisabled,

    /// The widget has been unmounted
    #[error("Widget is unmounted")]
    Unmounted,
}

/// Cloneable handle for feeding a running widget
#[derive(Clone, Debug)]
pub struct WidgetHandle {
    actions: mpsc::Sender<UserAction>,
    audio: mpsc::UnboundedSender<AudioEvent>,
    live_chat: mpsc::UnboundedSender<LiveChatEvent>,
    state: watch::Receiver<Session>,
}

impl WidgetHandle {
    /// Queue a user action
    pub async fn act(&self, action: UserAction) -> Result<(), WidgetError> {
        self.actions
            .send(action)
            .await
            .map_err(|_| WidgetError::Unmounted)
    }

    /// Report an audio lifecycle event
    pub fn audio(&self, event: AudioEvent) -> Result<(), WidgetError> {
        self.audio.send(event).map_err(|_| WidgetError::Unmounted)
    }

    /// Report a live-chat collaborator event
    pub fn live_chat(&self, event: LiveChatEvent) -> Result<(), WidgetError> {
        self.live_chat
            .send(event)
            .map_err(|_| WidgetError::Unmounted)
    }

    /// Ask the widget to unmount
    pub async fn unmount(&self) -> Result<(), WidgetError> {
        self.act(UserAction::Unmount).await
    }

    /// Latest committed session state
    #[must_use]
    pub fn state(&self) -> watch::Receiver<Session> {
        self.state.clone()
    }

    /// Session snapshots as a stream, starting with the current one
    ///
    /// Intermediate snapshots may be skipped when the consumer lags; the
    /// latest one is always delivered.
    #[must_use]
    pub fn changes(&self) -> WatchStream<Session> {
        WatchStream::new(self.state.clone())
    }
}

/// A mounted widget
pub struct Widget<B: DialogBackend + 'static> {
    session: SessionMachine,
    credentials: Arc<CredentialStore>,
    orchestrator: ConversationOrchestrator<B>,
    completions: mpsc::UnboundedReceiver<OrchestratorEvent>,
    dispatcher: ProtocolDispatcher,
    channel: CrossWindowChannel,
    outbound: OutboundSender,
    locales: LocaleSelection,
    locale_store: Box<dyn LocaleStore>,
    enable_live_chat: bool,
    running_embedded: bool,
    actions: mpsc::Receiver<UserAction>,
    audio: mpsc::UnboundedReceiver<AudioEvent>,
    live_chat: mpsc::UnboundedReceiver<LiveChatEvent>,
    mounted: bool,
}

impl<B: DialogBackend + 'static> Widget<B> {
    /// Mount a widget with a fresh credential store
    pub fn new(config: &WidgetConfig, backend: B) -> (Self, ParentWindow, WidgetHandle) {
        Self::with_credentials(config, backend, Arc::new(CredentialStore::default()))
    }

    /// Mount a widget sharing `credentials` with its backend
    pub fn with_credentials(
        config: &WidgetConfig,
        backend: B,
        credentials: Arc<CredentialStore>,
    ) -> (Self, ParentWindow, WidgetHandle) {
        let (channel, parent) = CrossWindowChannel::pair(&config.channel);
        let transcript =
            Transcript::with_limits(config.transcript_max_entries, config.transcript_max_bytes);
        let (orchestrator, completions) = ConversationOrchestrator::new(backend, transcript);
        let mut orchestrator = orchestrator.with_error_details(config.show_error_details);

        let locales = LocaleSelection::new(config.locales.clone());
        orchestrator.set_locale(locales.current().map(String::from));

        let session = SessionMachine::new();
        let (action_tx, actions) = mpsc::channel(ACTION_QUEUE);
        let (audio_tx, audio) = mpsc::unbounded_channel();
        let (live_chat_tx, live_chat) = mpsc::unbounded_channel();
        let handle = WidgetHandle {
            actions: action_tx,
            audio: audio_tx,
            live_chat: live_chat_tx,
            state: session.subscribe(),
        };

        tracing::info!(
            embedded = config.running_embedded,
            live_chat = config.enable_live_chat,
            locale = ?locales.current(),
            "Widget mounted"
        );

        let widget = Self {
            session,
            credentials,
            orchestrator,
            completions,
            dispatcher: ProtocolDispatcher::new(),
            outbound: channel.outbound(),
            channel,
            locales,
            locale_store: Box::new(MemoryLocaleStore::default()),
            enable_live_chat: config.enable_live_chat,
            running_embedded: config.running_embedded,
            actions,
            audio,
            live_chat,
            mounted: true,
        };
        (widget, parent, handle)
    }

    /// Persist locale choices in `store`, restoring any earlier choice
    #[must_use]
    pub fn with_locale_store(mut self, store: Box<dyn LocaleStore>) -> Self {
        self.locales.restore(store.as_ref());
        self.orchestrator
            .set_locale(self.locales.current().map(String::from));
        self.locale_store = store;
        self
    }

    /// Attach the live-agent collaborator
    #[must_use]
    pub fn with_live_chat_agent(mut self, agent: Arc<dyn LiveChatAgent>) -> Self {
        self.orchestrator = self.orchestrator.with_live_chat(agent);
        self
    }

    /// Session state machine
    #[must_use]
    pub fn session(&self) -> &SessionMachine {
        &self.session
    }

    /// Credential store
    #[must_use]
    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Conversation transcript
    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        self.orchestrator.transcript()
    }

    /// Locale list, active first
    #[must_use]
    pub fn locales(&self) -> &LocaleSelection {
        &self.locales
    }

    /// Dispatcher counters
    #[must_use]
    pub fn dispatcher(&self) -> &ProtocolDispatcher {
        &self.dispatcher
    }

    /// Whether `unmount` has run
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Drive the widget until it is unmounted or the parent goes away
    pub async fn run(&mut self) {
        while self.mounted {
            tokio::select! {
                biased;

                event = self.channel.next_event() => match event {
                    Some(event) => {
                        self.handle_inbound(event);
                    }
                    None => {
                        tracing::info!("Parent window closed");
                        break;
                    }
                },

                Some(event) = self.completions.recv() => {
                    self.orchestrator.handle_event(&mut self.session, event);
                }

                Some(action) = self.actions.recv() => {
                    let name = action_name(&action);
                    if let Err(e) = self.perform(action) {
                        tracing::warn!(action = name, error = %e, "User action had no effect");
                    }
                }

                Some(event) = self.audio.recv() => {
                    self.session.apply_audio(event);
                }

                Some(event) = self.live_chat.recv() => {
                    self.handle_live_chat(event);
                }
            }
        }
        self.unmount();
    }

    /// Route one admitted inbound event
    pub fn handle_inbound(&mut self, event: InboundEvent) -> DispatchOutcome {
        self.dispatcher.dispatch(
            event,
            DispatchTargets {
                session: &mut self.session,
                credentials: self.credentials.as_ref(),
                orchestrator: &mut self.orchestrator,
                outbound: &self.outbound,
            },
        )
    }

    /// Apply one user action
    pub fn perform(&mut self, action: UserAction) -> Result<(), WidgetError> {
        if !self.mounted {
            return Err(WidgetError::Unmounted);
        }
        match action {
            UserAction::SubmitText(text) => self.submit(&text, TurnKind::Human).map(drop),
            UserAction::ButtonClick(text) => self.submit(&text, TurnKind::Button).map(drop),
            UserAction::Feedback(text) => self.submit(&text, TurnKind::Feedback).map(drop),
            UserAction::RequestLogin => self.post(WidgetMessage::RequestLogin),
            UserAction::RequestLogout => self.post(WidgetMessage::RequestLogout),
            UserAction::RequestLiveChat => self.request_live_chat(),
            UserAction::EndLiveChat => self.end_live_chat().map(drop),
            UserAction::ToggleSfx => {
                self.session.toggle_sfx();
                Ok(())
            }
            UserAction::ToggleMinimize => self.toggle_minimize(),
            UserAction::SelectLocale(locale) => self.select_locale(&locale),
            UserAction::InterruptSpeech => {
                if !self.session.interrupt_speech() {
                    tracing::debug!("Nothing to interrupt");
                }
                Ok(())
            }
            UserAction::ClearAttachments => {
                self.clear_attachments();
                Ok(())
            }
            UserAction::PopUtterance => {
                self.session.pop_utterance();
                Ok(())
            }
            UserAction::ResetHistory => {
                self.orchestrator.reset_history(&mut self.session);
                Ok(())
            }
            UserAction::Unmount => {
                self.unmount();
                Ok(())
            }
        }
    }

    /// Submit text as a turn of the given kind
    pub fn submit(&mut self, text: &str, kind: TurnKind) -> Result<SubmitOutcome, WidgetError> {
        Ok(self
            .orchestrator
            .submit_turn(&mut self.session, text, kind)?)
    }

    /// Escalate to a live agent and tell the parent
    pub fn request_live_chat(&mut self) -> Result<(), WidgetError> {
        if !self.enable_live_chat {
            return Err(WidgetError::LiveChatDisabled);
        }
        let slot = self.outbound.try_reserve()?;
        self.session.enter_live_chat()?;
        self.orchestrator.notice("Requesting an agent...");
        slot.post(WidgetMessage::RequestLiveChat);
        Ok(())
    }

    /// Step the live chat towards disconnected
    ///
    /// The parent is told once, on the step into ENDING; finishing the
    /// teardown from ENDING posts nothing.
    pub fn end_live_chat(&mut self) -> Result<LiveChatStatus, WidgetError> {
        let announce = matches!(
            self.session.session().live_chat_status,
            LiveChatStatus::Connecting | LiveChatStatus::Connected
        );
        let slot = if announce {
            Some(self.outbound.try_reserve()?)
        } else {
            None
        };
        let status = self.session.exit_live_chat()?;
        if let Some(slot) = slot {
            slot.post(WidgetMessage::RequestLiveChatEnd);
        }
        Ok(status)
    }

    /// Flip the minimized flag; the parent is told when embedded
    pub fn toggle_minimize(&mut self) -> Result<(), WidgetError> {
        self.session.toggle_minimized();
        if self.running_embedded {
            self.post(WidgetMessage::ToggleMinimizeUi)?;
        }
        Ok(())
    }

    /// Make `locale` active and persist it
    pub fn select_locale(&mut self, locale: &str) -> Result<(), WidgetError> {
        self.locales.select(locale, self.locale_store.as_ref())?;
        self.orchestrator
            .set_locale(self.locales.current().map(String::from));
        Ok(())
    }

    /// Uploaded files, decoded leniently from the session attribute
    ///
    /// A missing or unparsable attribute yields an empty list; entries
    /// without a file name are skipped.
    #[must_use]
    pub fn attachments(&self) -> Vec<Attachment> {
        let Some(raw) = self
            .session
            .session()
            .session_attributes
            .get(ATTACHMENTS_ATTRIBUTE)
        else {
            return Vec::new();
        };
        match serde_json::from_str::<Vec<Value>>(raw) {
            Ok(items) => items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring unparsable attachment list");
                Vec::new()
            }
        }
    }

    /// Drop the uploaded-file list
    pub fn clear_attachments(&mut self) {
        if self.session.clear_attribute(ATTACHMENTS_ATTRIBUTE).is_some() {
            tracing::debug!("Attachments cleared");
        }
    }

    /// Apply a live-chat collaborator event
    pub fn handle_live_chat(&mut self, event: LiveChatEvent) {
        match event {
            LiveChatEvent::Established => {
                if self.session.live_chat_established().is_ok() {
                    self.orchestrator.notice("An agent has joined the chat.");
                }
            }
            LiveChatEvent::AgentMessage(text) => {
                self.orchestrator.agent_message(text);
            }
            LiveChatEvent::Ended => {
                if self.session.live_chat_ended().is_ok() {
                    self.orchestrator.notice("The live chat has ended.");
                }
            }
        }
    }

    /// Tear down: clear credentials and stop listening to the parent
    ///
    /// Idempotent.
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;
        self.credentials.clear();
        self.session.set_logged_in(false);
        self.channel.close();
        tracing::info!(
            dropped = self.channel.dropped_count(),
            stats = ?self.dispatcher.stats(),
            "Widget unmounted"
        );
    }

    fn post(&self, message: WidgetMessage) -> Result<(), WidgetError> {
        Ok(self.outbound.try_post(message)?)
    }
}

fn action_name(action: &UserAction) -> &'static str {
    match action {
        UserAction::SubmitText(_) => "submitText",
        UserAction::ButtonClick(_) => "buttonClick",
        UserAction::Feedback(_) => "feedback",
        UserAction::RequestLogin => "requestLogin",
        UserAction::RequestLogout => "requestLogout",
        UserAction::RequestLiveChat => "requestLiveChat",
        UserAction::EndLiveChat => "endLiveChat",
        UserAction::ToggleSfx => "toggleSfx",
        UserAction::ToggleMinimize => "toggleMinimize",
        UserAction::SelectLocale(_) => "selectLocale",
        UserAction::InterruptSpeech => "interruptSpeech",
        UserAction::ClearAttachments => "clearAttachments",
        UserAction::PopUtterance => "popUtterance",
        UserAction::ResetHistory => "resetHistory",
        UserAction::Unmount => "unmount",
    }
}
