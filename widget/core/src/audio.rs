//! Audio Collaborator Interface
//!
//! Events raised by the recording/playback subsystem, and the interrupt
//! flag it observes. Capture and playback themselves live outside the core.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Lifecycle events from the audio subsystem
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum AudioEvent {
    /// Microphone capture started
    RecordingStarted,
    /// Microphone capture stopped
    RecordingStopped,
    /// Bot speech playback started
    SpeechPlaybackStarted,
    /// Bot speech playback ended (or was cut short)
    SpeechPlaybackEnded,
    /// Microphone mute detection changed
    MicMuted(bool),
}

/// Shared flag asking the audio subsystem to stop playback
///
/// Raised by the session machine, polled by the audio collaborator.
#[derive(Clone, Debug, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    /// New, lowered flag
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an interrupt
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether an interrupt is pending
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Consume a pending interrupt; returns whether one was pending
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    /// Lower the flag
    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Text shown next to the microphone button
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecorderStatus {
    /// Capturing the user's voice
    Listening,
    /// Playing the bot's spoken reply
    PlayingAudio,
    /// Waiting for the dialog backend
    Processing,
    /// Capturing but the microphone seems muted
    MicMuted,
    /// Stopping playback on user request
    Interrupting,
    /// Nothing happening
    Idle,
}

impl fmt::Display for RecorderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Listening => "Listening...",
            Self::PlayingAudio => "Playing audio...",
            Self::Processing => "Processing...",
            Self::MicMuted => "Microphone seems to be muted...",
            Self::Interrupting => "Interrupting...",
            Self::Idle => "Click on the mic",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_interrupt_flag_shared() {
        let flag = InterruptFlag::new();
        let observer = flag.clone();
        assert!(!observer.is_raised());

        flag.raise();
        assert!(observer.is_raised());
        assert!(observer.take());
        assert!(!flag.is_raised());
    }

    #[test]
    fn test_audio_event_serde() {
        let event: AudioEvent =
            serde_json::from_value(json!({ "type": "micMuted", "value": true })).unwrap();
        assert_eq!(event, AudioEvent::MicMuted(true));

        let event: AudioEvent = serde_json::from_value(json!({ "type": "recordingStarted" })).unwrap();
        assert_eq!(event, AudioEvent::RecordingStarted);
    }

    #[test]
    fn test_recorder_status_text() {
        assert_eq!(RecorderStatus::Idle.to_string(), "Click on the mic");
        assert_eq!(RecorderStatus::Listening.to_string(), "Listening...");
    }
}
