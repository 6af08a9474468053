//! Structured event stream for state transitions
//!
//! Every decision the core makes is mirrored onto a broadcast channel as a
//! `StateEvent`, JSON-serializable so an operator console or test harness
//! can assert on the exact transition sequence.

use serde::{Deserialize, Serialize};

use crate::button::{ButtonId, CallerId, RecordingChannel};
use crate::language::{ClipId, LanguageCode, LanguageRole};

/// Why a hold session resolved to Cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// Button released before the confirmation window elapsed
    ReleasedEarly,
    /// Re-entrant press of the same button, or a sibling illegal press
    Disturbed,
    /// Two or more buttons were held when the window elapsed
    IllegalState,
}

/// Events emitted by the core during transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    /// A debounced press edge was registered
    ButtonPressed { button: ButtonId },

    /// A debounced release edge was registered
    ButtonReleased { button: ButtonId },

    /// Release of a button that was never tracked as down (ignored)
    SpuriousRelease { button: ButtonId },

    /// Two or more buttons are now held simultaneously
    IllegalStateEntered { held: Vec<ButtonId> },

    /// All buttons released after an illegal concurrent press
    IllegalStateCleared,

    /// A hold session entered its confirmation window
    SessionArmed { button: ButtonId },

    /// A hold session's window elapsed undisturbed
    SessionConfirmed { button: ButtonId },

    /// A hold session resolved without taking effect
    SessionCancelled {
        button: ButtonId,
        reason: CancelReason,
    },

    /// Recording began on a microphone channel
    RecordingStarted { channel: RecordingChannel },

    /// A recording artifact was deleted without entering the pipeline
    RecordingDiscarded { channel: RecordingChannel },

    /// A language selection advanced
    LanguageChanged {
        role: LanguageRole,
        code: LanguageCode,
    },

    /// A clip was admitted to the speaker
    PlaybackStarted { clip: ClipId, owner: CallerId },

    /// A caller outside the active clip's whitelist was refused
    PlaybackDenied { caller: CallerId, owner: CallerId },

    /// An active clip was terminated in favor of a new one
    PlaybackPreempted {
        previous_owner: CallerId,
        owner: CallerId,
    },

    /// The active clip ran to completion and released the speaker
    PlaybackCompleted { owner: CallerId },

    /// A confirmed recording made it through transcribe/translate/synthesize
    PipelineCompleted {
        channel: RecordingChannel,
        duration_ms: u64,
    },

    /// The external pipeline failed; no clip is played
    PipelineFailed {
        channel: RecordingChannel,
        error: String,
    },
}

impl std::fmt::Display for StateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateEvent::ButtonPressed { button } => write!(f, "PRESSED {button}"),
            StateEvent::ButtonReleased { button } => write!(f, "RELEASED {button}"),
            StateEvent::SpuriousRelease { button } => write!(f, "SPURIOUS_RELEASE {button}"),
            StateEvent::IllegalStateEntered { held } => {
                write!(f, "ILLEGAL_STATE ({} buttons held)", held.len())
            }
            StateEvent::IllegalStateCleared => write!(f, "ILLEGAL_STATE_CLEARED"),
            StateEvent::SessionArmed { button } => write!(f, "ARMED {button}"),
            StateEvent::SessionConfirmed { button } => write!(f, "CONFIRMED {button}"),
            StateEvent::SessionCancelled { button, reason } => {
                write!(f, "CANCELLED {button} ({reason:?})")
            }
            StateEvent::RecordingStarted { channel } => write!(f, "RECORDING_STARTED {channel}"),
            StateEvent::RecordingDiscarded { channel } => {
                write!(f, "RECORDING_DISCARDED {channel}")
            }
            StateEvent::LanguageChanged { role, code } => {
                write!(f, "LANGUAGE_CHANGED {role:?} -> {code}")
            }
            StateEvent::PlaybackStarted { clip, owner } => {
                write!(f, "PLAYBACK_STARTED {clip} (owner {owner})")
            }
            StateEvent::PlaybackDenied { caller, owner } => {
                write!(f, "PLAYBACK_DENIED {caller} (owner {owner})")
            }
            StateEvent::PlaybackPreempted {
                previous_owner,
                owner,
            } => write!(f, "PLAYBACK_PREEMPTED {previous_owner} -> {owner}"),
            StateEvent::PlaybackCompleted { owner } => write!(f, "PLAYBACK_COMPLETED {owner}"),
            StateEvent::PipelineCompleted {
                channel,
                duration_ms,
            } => write!(f, "PIPELINE_COMPLETED {channel} ({duration_ms}ms)"),
            StateEvent::PipelineFailed { channel, error } => {
                write!(f, "PIPELINE_FAILED {channel}: {error}")
            }
        }
    }
}
