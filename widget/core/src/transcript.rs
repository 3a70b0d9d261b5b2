//! Conversation Transcript
//!
//! The message log the rendering layer displays: human input, bot and agent
//! replies, feedback, and error entries for failed turns.
//!
//! # Design Philosophy
//!
//! The transcript is bounded. When either the entry limit or the content
//! byte limit is exceeded, the oldest entries are pruned first, so a
//! long-lived widget keeps a stable memory footprint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::DialogState;
use crate::interactive::InteractiveMessage;
use crate::messages::MessageId;

/// Who or what produced a transcript entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryKind {
    /// Typed or spoken user input
    Human,
    /// Dialog backend reply
    Bot,
    /// Live agent message
    Agent,
    /// Feedback the user gave on a reply
    Feedback,
    /// Response-card button the user clicked
    Button,
    /// A failed turn or forward
    Error,
    /// Informational notice (live chat started/ended)
    System,
}

/// One transcript entry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    /// Unique entry ID
    pub id: MessageId,
    /// Producer
    pub kind: EntryKind,
    /// Text as received
    pub text: String,
    /// Parsed template, for bot replies that carry one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interactive: Option<InteractiveMessage>,
    /// Dialog state reported with a bot reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialog_state: Option<DialogState>,
    /// When the entry was added
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEntry {
    /// Create an entry stamped now
    pub fn new(kind: EntryKind, text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            kind,
            text: text.into(),
            interactive: None,
            dialog_state: None,
            timestamp: Utc::now(),
        }
    }

    /// Bot reply, parsed for interactive templates
    pub fn bot(text: impl Into<String>, dialog_state: Option<DialogState>) -> Self {
        let mut entry = Self::new(EntryKind::Bot, text);
        entry.interactive = InteractiveMessage::parse(&entry.text);
        entry.dialog_state = dialog_state;
        entry
    }

    /// Whether this entry renders as an interactive template
    #[must_use]
    pub fn is_interactive(&self) -> bool {
        self.interactive.is_some()
    }
}

/// Bounded, ordered message log
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
    /// Maximum entries to keep (0 = unlimited)
    max_entries: usize,
    /// Maximum total text bytes (0 = unlimited)
    max_content_bytes: usize,
    content_bytes: usize,
}

impl Transcript {
    /// Unbounded transcript
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transcript with limits (0 disables a limit)
    #[must_use]
    pub fn with_limits(max_entries: usize, max_content_bytes: usize) -> Self {
        Self {
            max_entries,
            max_content_bytes,
            ..Self::default()
        }
    }

    /// Append an entry, pruning if needed; returns its ID
    pub fn push(&mut self, entry: TranscriptEntry) -> MessageId {
        let id = entry.id.clone();
        self.content_bytes += entry.text.len();
        self.entries.push(entry);
        self.prune_if_needed();
        id
    }

    /// Append a text entry of the given kind
    pub fn push_text(&mut self, kind: EntryKind, text: impl Into<String>) -> MessageId {
        self.push(TranscriptEntry::new(kind, text))
    }

    /// All entries, oldest first
    #[must_use]
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Most recent entry
    #[must_use]
    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    /// Entry by ID
    #[must_use]
    pub fn get(&self, id: &MessageId) -> Option<&TranscriptEntry> {
        self.entries.iter().find(|e| &e.id == id)
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the transcript is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total text bytes held
    #[must_use]
    pub fn content_bytes(&self) -> usize {
        self.content_bytes
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
        self.content_bytes = 0;
    }

    fn prune_if_needed(&mut self) {
        let mut removed = 0;

        if self.max_entries > 0 && self.entries.len() > self.max_entries {
            let excess = self.entries.len() - self.max_entries;
            for entry in self.entries.drain(..excess) {
                self.content_bytes = self.content_bytes.saturating_sub(entry.text.len());
            }
            removed += excess;
        }

        // Always keep the newest entry, even if it alone exceeds the limit
        if self.max_content_bytes > 0 {
            while self.content_bytes > self.max_content_bytes && self.entries.len() > 1 {
                let entry = self.entries.remove(0);
                self.content_bytes = self.content_bytes.saturating_sub(entry.text.len());
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::debug!(
                removed,
                remaining = self.entries.len(),
                bytes = self.content_bytes,
                "Pruned transcript"
            );
        }
    }
}
