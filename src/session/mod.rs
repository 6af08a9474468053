//! Hold-to-confirm session state machines
//!
//! One confirmer per gesture button converts a press edge plus an elapsed
//! hold window into a confirmed or cancelled decision.

mod confirmer;

pub use confirmer::{ArmTicket, GestureKind, HoldConfirmer, ReleaseOutcome, TimerVerdict};
