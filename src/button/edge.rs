//! Button identifiers and logical edge events
//!
//! Edges arrive pre-debounced from the external GPIO layer; per-button
//! ordering (a release follows its press) is guaranteed by that layer,
//! ordering between different buttons is not.

use serde::{Deserialize, Serialize};

/// The four physical buttons of the appliance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonId {
    /// Guest microphone: press-and-hold to record the guest speaking
    Guest,
    /// User microphone: press-and-hold to record the user speaking
    User,
    /// Cycle the guest's (source) language
    Source,
    /// Cycle the user's (target) language
    Target,
}

impl ButtonId {
    /// All buttons, in wiring order
    pub const ALL: [ButtonId; 4] = [
        ButtonId::Guest,
        ButtonId::User,
        ButtonId::Source,
        ButtonId::Target,
    ];

    /// The recording channel gated by this button, if it is a recording button
    pub fn recording_channel(self) -> Option<RecordingChannel> {
        match self {
            ButtonId::Guest => Some(RecordingChannel::Guest),
            ButtonId::User => Some(RecordingChannel::User),
            ButtonId::Source | ButtonId::Target => None,
        }
    }

    /// Whether this button cycles a language selection
    pub fn is_language_button(self) -> bool {
        matches!(self, ButtonId::Source | ButtonId::Target)
    }
}

impl std::fmt::Display for ButtonId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ButtonId::Guest => write!(f, "guest"),
            ButtonId::User => write!(f, "user"),
            ButtonId::Source => write!(f, "source"),
            ButtonId::Target => write!(f, "target"),
        }
    }
}

/// Logical edge direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    Pressed,
    Released,
}

/// A debounced edge event for one button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEdge {
    pub button: ButtonId,
    pub edge: Edge,
}

impl ButtonEdge {
    pub fn pressed(button: ButtonId) -> Self {
        Self {
            button,
            edge: Edge::Pressed,
        }
    }

    pub fn released(button: ButtonId) -> Self {
        Self {
            button,
            edge: Edge::Released,
        }
    }
}

/// Identity of a playback requester, used for speaker ownership
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerId {
    /// One of the four buttons
    Button(ButtonId),
    /// The daemon itself (startup greeting)
    System,
}

impl CallerId {
    /// Whitelist covering every button (greeting and translation clips)
    pub fn all_buttons() -> Vec<CallerId> {
        ButtonId::ALL.iter().copied().map(CallerId::Button).collect()
    }
}

impl std::fmt::Display for CallerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallerId::Button(b) => write!(f, "{b}"),
            CallerId::System => write!(f, "system"),
        }
    }
}

/// Logical recorder channel, one microphone each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingChannel {
    Guest,
    User,
}

impl std::fmt::Display for RecordingChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordingChannel::Guest => write!(f, "guest"),
            RecordingChannel::User => write!(f, "user"),
        }
    }
}
