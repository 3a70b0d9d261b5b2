//! Session State Machine
//!
//! The single authoritative copy of a widget's conversation state: chat
//! mode, live-chat status, dialog-turn status, recording and speech status,
//! login status, session attributes and utterance history.
//!
//! # Design Philosophy
//!
//! Fields are never mutated directly. Every change goes through a transition
//! method on [`SessionMachine`], which checks its precondition, applies the
//! change and notifies subscribers before returning. Transitions are plain
//! synchronous methods: nothing in this module suspends, so no subscriber
//! can observe a half-applied transition.
//!
//! ```text
//!   live chat:  DISCONNECTED ──enter──► CONNECTING ──established──► CONNECTED
//!                    ▲                      │                           │
//!                    │                      └──────exit──────┐   ┌──exit┘
//!                    │                                       ▼   ▼
//!                    └──────────exit / ended──────────────── ENDING
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use crate::audio::{AudioEvent, InterruptFlag, RecorderStatus};
use crate::backend::DialogState;

/// Who answers the user
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatMode {
    /// The automated dialog backend
    #[default]
    Bot,
    /// A human agent
    #[serde(rename = "LIVECHAT")]
    LiveChat,
}

/// Live-agent connection status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiveChatStatus {
    /// No live chat
    #[default]
    Disconnected,
    /// Escalation requested, agent not yet joined
    Connecting,
    /// Talking to an agent
    Connected,
    /// Teardown in progress
    Ending,
}

impl fmt::Display for LiveChatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Ending => "ENDING",
        };
        f.write_str(s)
    }
}

/// Dialog turn status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnStatus {
    /// Ready for input
    #[default]
    Idle,
    /// A turn is in flight
    Processing,
}

/// Microphone status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordingStatus {
    /// Not recording
    #[default]
    Idle,
    /// Capturing the user's voice
    Listening,
    /// Playback interrupt requested
    Interrupting,
}

/// Snapshot of the conversation state
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Who answers the user
    pub chat_mode: ChatMode,
    /// Live-agent connection status
    pub live_chat_status: LiveChatStatus,
    /// Dialog turn status
    pub turn_status: TurnStatus,
    /// Microphone status
    pub recording: RecordingStatus,
    /// Bot speech is playing
    pub bot_speaking: bool,
    /// Microphone appears muted
    pub mic_muted: bool,
    /// The parent confirmed a login
    pub is_logged_in: bool,
    /// Key/value bag carried across turns
    pub session_attributes: BTreeMap<String, String>,
    /// Human utterances, most recent last
    pub utterance_history: Vec<String>,
    /// Dialog state of the last bot reply
    pub dialog_state: Option<DialogState>,
    /// Sound effects enabled
    pub sfx_enabled: bool,
    /// Widget minimized
    pub ui_minimized: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            chat_mode: ChatMode::Bot,
            live_chat_status: LiveChatStatus::Disconnected,
            turn_status: TurnStatus::Idle,
            recording: RecordingStatus::Idle,
            bot_speaking: false,
            mic_muted: false,
            is_logged_in: false,
            session_attributes: BTreeMap::new(),
            utterance_history: Vec::new(),
            dialog_state: None,
            sfx_enabled: true,
            ui_minimized: false,
        }
    }
}

impl Session {
    /// Whether a dialog turn is in flight
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.turn_status == TurnStatus::Processing
    }

    /// Whether user text goes to the live agent
    #[must_use]
    pub fn is_live_chat_connected(&self) -> bool {
        self.chat_mode == ChatMode::LiveChat && self.live_chat_status == LiveChatStatus::Connected
    }

    /// Status text for the microphone button
    #[must_use]
    pub fn recorder_status(&self) -> RecorderStatus {
        match self.recording {
            RecordingStatus::Interrupting => RecorderStatus::Interrupting,
            RecordingStatus::Listening if self.mic_muted => RecorderStatus::MicMuted,
            RecordingStatus::Listening => RecorderStatus::Listening,
            RecordingStatus::Idle if self.bot_speaking => RecorderStatus::PlayingAudio,
            RecordingStatus::Idle if self.is_processing() => RecorderStatus::Processing,
            RecordingStatus::Idle => RecorderStatus::Idle,
        }
    }

    fn invariants_hold(&self) -> bool {
        self.live_chat_status == LiveChatStatus::Disconnected || self.chat_mode == ChatMode::LiveChat
    }
}

/// What a transition changed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionChange {
    /// A dialog turn was admitted
    TurnStarted,
    /// The dialog turn ended
    TurnEnded,
    /// Live-chat status moved (chat mode may have moved with it)
    LiveChat(LiveChatStatus),
    /// Utterance history changed
    Utterances,
    /// Session attributes changed
    Attributes,
    /// Login status changed
    LoggedIn(bool),
    /// Recording, speech or mute status changed
    Audio,
    /// Utterance history cleared
    HistoryReset,
    /// Sound effects or minimized flag changed
    Preferences,
}

/// Subscriber notified synchronously on every successful transition
pub trait SessionObserver: Send + Sync {
    /// Called after the change was applied
    fn on_change(&self, change: &SessionChange, session: &Session);
}

/// Transition failures; all are non-fatal and leave state unchanged
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A dialog turn is already in flight
    #[error("A turn is already processing")]
    AlreadyProcessing,

    /// The transition is not legal from the current live-chat status
    #[error("Invalid transition: {action} while {from}")]
    InvalidTransition {
        /// Attempted transition
        action: &'static str,
        /// Live-chat status at the time
        from: LiveChatStatus,
    },
}

/// Attributes and dialog state returned by a finished turn
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TurnResult {
    /// Attributes to merge (new keys added, existing keys overwritten)
    pub attributes: BTreeMap<String, String>,
    /// Dialog state after the turn
    pub dialog_state: Option<DialogState>,
}

impl TurnResult {
    /// A turn that produced nothing (failure path)
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Owner of the [`Session`]; the only place state changes
pub struct SessionMachine {
    state: Session,
    observers: Vec<Arc<dyn SessionObserver>>,
    watch_tx: watch::Sender<Session>,
    interrupt: InterruptFlag,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionMachine")
            .field("state", &self.state)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl SessionMachine {
    /// Create a machine with default state
    #[must_use]
    pub fn new() -> Self {
        Self::with_state(Session::default())
    }

    /// Create a machine from an initial state
    #[must_use]
    pub fn with_state(state: Session) -> Self {
        let (watch_tx, _) = watch::channel(state.clone());
        Self {
            state,
            observers: Vec::new(),
            watch_tx,
            interrupt: InterruptFlag::new(),
        }
    }

    /// Current state
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.state
    }

    /// Register a synchronous observer
    pub fn add_observer(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    /// Receiver that always holds the latest committed state
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.watch_tx.subscribe()
    }

    /// Flag shared with the audio subsystem
    #[must_use]
    pub fn interrupt_flag(&self) -> InterruptFlag {
        self.interrupt.clone()
    }

    // ========================================================================
    // Dialog turns
    // ========================================================================

    /// Admit a dialog turn
    pub fn begin_turn(&mut self) -> Result<(), SessionError> {
        if self.state.is_processing() {
            return Err(SessionError::AlreadyProcessing);
        }
        self.state.turn_status = TurnStatus::Processing;
        self.commit(SessionChange::TurnStarted);
        Ok(())
    }

    /// End the dialog turn and merge its attributes
    pub fn end_turn(&mut self, result: TurnResult) {
        if !self.state.is_processing() {
            tracing::debug!("end_turn while idle");
        }
        self.state.turn_status = TurnStatus::Idle;
        let merged = !result.attributes.is_empty();
        self.state.session_attributes.extend(result.attributes);
        if result.dialog_state.is_some() {
            self.state.dialog_state = result.dialog_state;
        }
        self.commit(SessionChange::TurnEnded);
        if merged {
            tracing::trace!(
                count = self.state.session_attributes.len(),
                "Session attributes merged"
            );
        }
    }

    // ========================================================================
    // Live chat
    // ========================================================================

    /// DISCONNECTED → CONNECTING, switching to live-chat mode
    pub fn enter_live_chat(&mut self) -> Result<(), SessionError> {
        match self.state.live_chat_status {
            LiveChatStatus::Disconnected => {
                self.state.chat_mode = ChatMode::LiveChat;
                self.set_live_chat(LiveChatStatus::Connecting);
                Ok(())
            }
            from => Err(self.invalid("enterLiveChat", from)),
        }
    }

    /// CONNECTING → CONNECTED, once the agent joined
    pub fn live_chat_established(&mut self) -> Result<(), SessionError> {
        match self.state.live_chat_status {
            LiveChatStatus::Connecting => {
                self.set_live_chat(LiveChatStatus::Connected);
                Ok(())
            }
            from => Err(self.invalid("liveChatEstablished", from)),
        }
    }

    /// Step the live chat towards DISCONNECTED
    ///
    /// CONNECTING/CONNECTED → ENDING (interrupting any speech playback);
    /// ENDING → DISCONNECTED (back to bot mode). Returns the new status.
    pub fn exit_live_chat(&mut self) -> Result<LiveChatStatus, SessionError> {
        match self.state.live_chat_status {
            LiveChatStatus::Connecting | LiveChatStatus::Connected => {
                self.interrupt.raise();
                self.set_live_chat(LiveChatStatus::Ending);
                Ok(LiveChatStatus::Ending)
            }
            LiveChatStatus::Ending => {
                self.finish_live_chat();
                Ok(LiveChatStatus::Disconnected)
            }
            from @ LiveChatStatus::Disconnected => Err(self.invalid("exitLiveChat", from)),
        }
    }

    /// The live-chat collaborator reports the chat is over
    ///
    /// From CONNECTING/CONNECTED the machine passes through ENDING first.
    pub fn live_chat_ended(&mut self) -> Result<(), SessionError> {
        match self.state.live_chat_status {
            LiveChatStatus::Disconnected => Err(self.invalid("liveChatEnded", LiveChatStatus::Disconnected)),
            LiveChatStatus::Ending => {
                self.finish_live_chat();
                Ok(())
            }
            LiveChatStatus::Connecting | LiveChatStatus::Connected => {
                self.interrupt.raise();
                self.set_live_chat(LiveChatStatus::Ending);
                self.finish_live_chat();
                Ok(())
            }
        }
    }

    fn finish_live_chat(&mut self) {
        self.state.chat_mode = ChatMode::Bot;
        self.set_live_chat(LiveChatStatus::Disconnected);
    }

    fn set_live_chat(&mut self, status: LiveChatStatus) {
        tracing::debug!(from = %self.state.live_chat_status, to = %status, "Live chat transition");
        self.state.live_chat_status = status;
        self.commit(SessionChange::LiveChat(status));
    }

    fn invalid(&self, action: &'static str, from: LiveChatStatus) -> SessionError {
        tracing::warn!(action, from = %from, "Invalid live chat transition ignored");
        SessionError::InvalidTransition { action, from }
    }

    // ========================================================================
    // Utterance history
    // ========================================================================

    /// Append a human utterance
    pub fn push_utterance(&mut self, text: impl Into<String>) {
        self.state.utterance_history.push(text.into());
        self.commit(SessionChange::Utterances);
    }

    /// Remove and return the most recent utterance; no-op when empty
    pub fn pop_utterance(&mut self) -> Option<String> {
        let popped = self.state.utterance_history.pop()?;
        self.commit(SessionChange::Utterances);
        Some(popped)
    }

    /// Most recent utterance
    #[must_use]
    pub fn last_utterance(&self) -> Option<&str> {
        self.state.utterance_history.last().map(String::as_str)
    }

    /// Clear utterance history
    pub fn reset_history(&mut self) {
        self.state.utterance_history.clear();
        self.commit(SessionChange::HistoryReset);
    }

    // ========================================================================
    // Attributes and login
    // ========================================================================

    /// Set one session attribute
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.state
            .session_attributes
            .insert(key.into(), value.into());
        self.commit(SessionChange::Attributes);
    }

    /// Remove one session attribute
    pub fn clear_attribute(&mut self, key: &str) -> Option<String> {
        let removed = self.state.session_attributes.remove(key)?;
        self.commit(SessionChange::Attributes);
        Some(removed)
    }

    /// Record the login status; unchanged status is a no-op
    pub fn set_logged_in(&mut self, logged_in: bool) {
        if self.state.is_logged_in == logged_in {
            return;
        }
        self.state.is_logged_in = logged_in;
        self.commit(SessionChange::LoggedIn(logged_in));
    }

    // ========================================================================
    // Audio
    // ========================================================================

    /// Apply an event from the audio subsystem
    pub fn apply_audio(&mut self, event: AudioEvent) {
        match event {
            AudioEvent::RecordingStarted => self.state.recording = RecordingStatus::Listening,
            AudioEvent::RecordingStopped => {
                self.state.recording = RecordingStatus::Idle;
                self.state.mic_muted = false;
            }
            AudioEvent::SpeechPlaybackStarted => self.state.bot_speaking = true,
            AudioEvent::SpeechPlaybackEnded => {
                self.state.bot_speaking = false;
                if self.state.recording == RecordingStatus::Interrupting {
                    self.state.recording = RecordingStatus::Idle;
                }
            }
            AudioEvent::MicMuted(muted) => self.state.mic_muted = muted,
        }
        self.commit(SessionChange::Audio);
    }

    /// Interrupt bot speech; returns false if nothing was playing
    pub fn interrupt_speech(&mut self) -> bool {
        if !self.state.bot_speaking {
            return false;
        }
        self.state.recording = RecordingStatus::Interrupting;
        self.interrupt.raise();
        self.commit(SessionChange::Audio);
        true
    }

    // ========================================================================
    // Preferences
    // ========================================================================

    /// Flip the sound-effects flag; returns the new value
    pub fn toggle_sfx(&mut self) -> bool {
        self.state.sfx_enabled = !self.state.sfx_enabled;
        self.commit(SessionChange::Preferences);
        self.state.sfx_enabled
    }

    /// Flip the minimized flag; returns the new value
    pub fn toggle_minimized(&mut self) -> bool {
        self.state.ui_minimized = !self.state.ui_minimized;
        self.commit(SessionChange::Preferences);
        self.state.ui_minimized
    }

    fn commit(&mut self, change: SessionChange) {
        debug_assert!(self.state.invariants_hold(), "session invariant violated");
        self.watch_tx.send_replace(self.state.clone());
        for observer in &self.observers {
            observer.on_change(&change, &self.state);
        }
    }
}
