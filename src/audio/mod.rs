//! Speaker arbitration
//!
//! The appliance has one speaker. The arbiter serializes access to it,
//! tracks which caller owns the active clip, and enforces the interrupt
//! whitelist when another caller wants the speaker.

mod arbiter;

pub use arbiter::{AudioArbiter, Playback, PlaybackError, PlaybackHandle, StartedClip};
