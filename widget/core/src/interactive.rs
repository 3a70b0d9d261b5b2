//! Interactive Messages
//!
//! Bot replies whose text is a structured template envelope:
//!
//! ```text
//! { "templateType": "QuickReply" | "ListPicker" | "Carousel" | "TimePicker",
//!   "data": { "content": { ... } } }
//! ```
//!
//! Parsing is stateless. Text that does not match an envelope is plain text,
//! not an error.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

/// A parsed interactive template
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "templateType", content = "data")]
pub enum InteractiveMessage {
    /// Row of quick-reply buttons
    QuickReply(TemplateData<QuickReplyContent>),
    /// Titled list of selectable items
    ListPicker(TemplateData<ListPickerContent>),
    /// Horizontally scrolling cards, each with its own choices
    Carousel(TemplateData<CarouselContent>),
    /// Appointment slots
    TimePicker(TemplateData<TimePickerContent>),
}

/// Template kind without its content
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateKind {
    /// Quick-reply buttons
    QuickReply,
    /// List picker
    ListPicker,
    /// Carousel
    Carousel,
    /// Time picker
    TimePicker,
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The `data` wrapper around template content
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateData<T> {
    /// Template content
    pub content: T,
}

/// A selectable element
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    /// Label, also the value sent back when clicked
    pub title: String,
    /// Secondary text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    /// Image URL or data URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
}

/// Quick-reply content
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickReplyContent {
    /// Prompt above the buttons
    #[serde(default)]
    pub title: Option<String>,
    /// Buttons
    #[serde(default)]
    pub elements: Vec<Choice>,
}

/// List-picker content
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPickerContent {
    /// List title
    #[serde(default)]
    pub title: Option<String>,
    /// List subtitle
    #[serde(default)]
    pub subtitle: Option<String>,
    /// Items
    #[serde(default)]
    pub elements: Vec<Choice>,
}

/// Choices nested inside a carousel card
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceList {
    /// Choices
    #[serde(default)]
    pub elements: Vec<Choice>,
}

/// One carousel card
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarouselCard {
    /// Card title
    #[serde(default)]
    pub title: String,
    /// Card subtitle
    #[serde(default)]
    pub subtitle: Option<String>,
    /// Card choices
    #[serde(default)]
    pub data: Option<TemplateData<ChoiceList>>,
}

impl CarouselCard {
    /// Choices on this card
    #[must_use]
    pub fn choices(&self) -> &[Choice] {
        self.data
            .as_ref()
            .map_or(&[][..], |d| d.content.elements.as_slice())
    }
}

/// Carousel content
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarouselContent {
    /// Cards
    #[serde(default)]
    pub elements: Vec<CarouselCard>,
}

/// One appointment slot
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    /// Start time, RFC 3339
    pub date: String,
    /// Duration in minutes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
}

/// Time-picker content
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePickerContent {
    /// Picker title
    #[serde(default)]
    pub title: Option<String>,
    /// Slots in the order the bot sent them
    #[serde(default)]
    pub timeslots: Vec<TimeSlot>,
}

impl TimePickerContent {
    /// Slots in chronological order; unparsable dates are skipped
    #[must_use]
    pub fn sorted_timeslots(&self) -> Vec<(DateTime<FixedOffset>, &TimeSlot)> {
        let mut slots: Vec<_> = self
            .timeslots
            .iter()
            .filter_map(|slot| match DateTime::parse_from_rfc3339(&slot.date) {
                Ok(at) => Some((at, slot)),
                Err(e) => {
                    tracing::debug!(date = %slot.date, error = %e, "Skipping unparsable time slot");
                    None
                }
            })
            .collect();
        slots.sort_by_key(|(at, _)| *at);
        slots
    }

    /// Sorted slots grouped by calendar day
    #[must_use]
    pub fn slots_by_day(&self) -> BTreeMap<NaiveDate, Vec<DateTime<FixedOffset>>> {
        let mut days: BTreeMap<NaiveDate, Vec<DateTime<FixedOffset>>> = BTreeMap::new();
        for (at, _) in self.sorted_timeslots() {
            days.entry(at.date_naive()).or_default().push(at);
        }
        days
    }
}

impl InteractiveMessage {
    /// Parse reply text; `None` means plain text
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if !trimmed.starts_with('{') {
            return None;
        }
        serde_json::from_str(trimmed).ok()
    }

    /// Template kind
    #[must_use]
    pub fn template_kind(&self) -> TemplateKind {
        match self {
            Self::QuickReply(_) => TemplateKind::QuickReply,
            Self::ListPicker(_) => TemplateKind::ListPicker,
            Self::Carousel(_) => TemplateKind::Carousel,
            Self::TimePicker(_) => TemplateKind::TimePicker,
        }
    }

    /// Title shown above the template
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        match self {
            Self::QuickReply(d) => d.content.title.as_deref(),
            Self::ListPicker(d) => d.content.title.as_deref(),
            Self::Carousel(d) => d.content.elements.first().map(|c| c.title.as_str()),
            Self::TimePicker(d) => d.content.title.as_deref(),
        }
    }

    /// Top-level choices (quick replies and list items)
    #[must_use]
    pub fn choices(&self) -> &[Choice] {
        match self {
            Self::QuickReply(d) => &d.content.elements,
            Self::ListPicker(d) => &d.content.elements,
            Self::Carousel(_) | Self::TimePicker(_) => &[],
        }
    }
}
