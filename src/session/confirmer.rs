//! Per-button hold-window state machine
//!
//! Two variants share one type. `PressAndHold` (recording buttons) stays
//! armed until release; the mid-hold timer only latches the verdict that
//! decides the recording's fate at release time. `CycleConfirm` (language
//! buttons) is terminal at timer fire and never observes release.
//!
//! The confirmer is purely synchronous; the machine schedules the actual
//! delay and calls back with the generation it armed. A generation counter
//! bumped on arm and on finish makes a timer that fires after its session
//! ended a guaranteed no-op.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::button::{ButtonId, RegistrySnapshot};
use crate::events::CancelReason;

/// Which gesture this button encodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    /// Hold at least the window, release to act (Guest/User)
    PressAndHold,
    /// Press once, window elapses, selection advances (Source/Target)
    CycleConfirm,
}

/// Returned by `arm`; the machine schedules a timer for `generation` and
/// attaches `disturbed` to the press registry broadcast.
pub struct ArmTicket {
    pub generation: u64,
    pub disturbed: Arc<AtomicBool>,
}

/// Decision taken in the timer's critical section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerVerdict {
    Confirmed,
    Cancelled(CancelReason),
}

/// Resolution of a press-and-hold session at release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Window elapsed undisturbed; the recording proceeds to the pipeline
    Confirmed { held: Duration },
    /// Released before the window elapsed; discard the recording
    ReleasedEarly { held: Duration },
    /// The timer already cancelled this session; discard the recording
    AlreadyCancelled { held: Duration },
}

struct HoldSession {
    started_at: Instant,
    disturbed: Arc<AtomicBool>,
    verdict: Option<TimerVerdict>,
    generation: u64,
}

struct Slot {
    generation: u64,
    session: Option<HoldSession>,
}

/// Hold-window confirmer for a single button
pub struct HoldConfirmer {
    button: ButtonId,
    kind: GestureKind,
    slot: Mutex<Slot>,
}

impl HoldConfirmer {
    pub fn new(button: ButtonId, kind: GestureKind) -> Self {
        Self {
            button,
            kind,
            slot: Mutex::new(Slot {
                generation: 0,
                session: None,
            }),
        }
    }

    pub fn kind(&self) -> GestureKind {
        self.kind
    }

    /// Whether a session is currently in flight
    pub fn is_armed(&self) -> bool {
        self.lock().session.is_some()
    }

    /// Start a new session. Callers must only arm after the registry
    /// admitted the press and any previous session ended.
    pub fn arm(&self, now: Instant) -> ArmTicket {
        let mut slot = self.lock();
        slot.generation += 1;
        let generation = slot.generation;
        let disturbed = Arc::new(AtomicBool::new(false));
        slot.session = Some(HoldSession {
            started_at: now,
            disturbed: Arc::clone(&disturbed),
            verdict: None,
            generation,
        });
        debug!(button = %self.button, generation, "session armed");
        ArmTicket {
            generation,
            disturbed,
        }
    }

    /// Re-entrant press of the same button while armed: invalidates the
    /// session without restarting the timer or the recording.
    pub fn mark_disturbed(&self) {
        let slot = self.lock();
        if let Some(session) = &slot.session {
            session.disturbed.store(true, Ordering::SeqCst);
            debug!(button = %self.button, "session disturbed by re-press");
        }
    }

    /// The hold timer fired. Evaluates the disturbance flag, the illegal
    /// flag, and (press-and-hold only) continued membership, all against
    /// one registry snapshot. Returns `None` when the timer is stale, i.e.
    /// the session it was scheduled for already ended.
    pub fn evaluate_timer(
        &self,
        generation: u64,
        snapshot: &RegistrySnapshot,
    ) -> Option<TimerVerdict> {
        let mut slot = self.lock();
        let session = slot.session.as_mut()?;
        if session.generation != generation || session.verdict.is_some() {
            return None;
        }

        let verdict = if session.disturbed.load(Ordering::SeqCst) {
            TimerVerdict::Cancelled(CancelReason::Disturbed)
        } else if snapshot.illegal {
            TimerVerdict::Cancelled(CancelReason::IllegalState)
        } else if self.kind == GestureKind::PressAndHold && !snapshot.is_held(self.button) {
            // release raced the timer; the release path owns the outcome
            return None;
        } else {
            TimerVerdict::Confirmed
        };

        session.verdict = Some(verdict);
        if self.kind == GestureKind::CycleConfirm {
            // terminal at timer fire; release is not awaited
            slot.session = None;
        }
        Some(verdict)
    }

    /// Release edge for a press-and-hold session. Returns `None` when no
    /// session is in flight (press was blocked, or a duplicate edge).
    pub fn finish(&self, now: Instant) -> Option<ReleaseOutcome> {
        debug_assert_eq!(self.kind, GestureKind::PressAndHold);
        let mut slot = self.lock();
        slot.generation += 1; // invalidate any pending timer
        let session = slot.session.take()?;
        let held = now.duration_since(session.started_at);

        Some(match session.verdict {
            Some(TimerVerdict::Confirmed) => ReleaseOutcome::Confirmed { held },
            Some(TimerVerdict::Cancelled(_)) => ReleaseOutcome::AlreadyCancelled { held },
            None => ReleaseOutcome::ReleasedEarly { held },
        })
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().expect("hold session lock poisoned")
    }
}
