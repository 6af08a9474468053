//! Press registry: the single source of truth for concurrent presses
//!
//! Tracks which buttons are currently down and derives the illegal-state
//! flag (two or more held at once). Inserting the press that makes the set
//! illegal also marks every attached hold session disturbed; both happen
//! under the same lock so timer callbacks never observe a half-updated
//! set/flag pair.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::button::ButtonId;
use crate::events::StateEvent;

/// Result of registering a press edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressOutcome {
    /// The press may arm a hold session (sole button down, not a duplicate)
    pub admitted: bool,
    /// The button was already down (re-entrant hardware edge)
    pub duplicate: bool,
    /// Two or more buttons are down after this press
    pub illegal: bool,
}

/// Atomic view of the registry for timer callbacks
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    pub held: HashSet<ButtonId>,
    pub illegal: bool,
}

impl RegistrySnapshot {
    pub fn is_held(&self, button: ButtonId) -> bool {
        self.held.contains(&button)
    }
}

struct Inner {
    down: HashSet<ButtonId>,
    illegal: bool,
    /// Disturbance flags of currently active hold sessions
    sessions: HashMap<ButtonId, Arc<AtomicBool>>,
}

/// Set of currently-down buttons, one mutex over membership, the illegal
/// flag, and the disturbance broadcast
pub struct PressRegistry {
    inner: Mutex<Inner>,
    event_tx: broadcast::Sender<StateEvent>,
}

impl PressRegistry {
    pub fn new(event_tx: broadcast::Sender<StateEvent>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                down: HashSet::new(),
                illegal: false,
                sessions: HashMap::new(),
            }),
            event_tx,
        }
    }

    /// Register a press edge. If this press makes the set illegal, every
    /// attached session is marked disturbed before the lock is dropped.
    pub fn press(&self, button: ButtonId) -> PressOutcome {
        let mut inner = self.lock();

        let duplicate = !inner.down.insert(button);
        let was_illegal = inner.illegal;
        inner.illegal = inner.down.len() >= 2;

        if inner.illegal {
            for flag in inner.sessions.values() {
                flag.store(true, Ordering::SeqCst);
            }
            if !was_illegal {
                let mut held: Vec<ButtonId> = inner.down.iter().copied().collect();
                held.sort_by_key(|b| *b as u8);
                warn!(?held, "illegal concurrent press");
                let _ = self.event_tx.send(StateEvent::IllegalStateEntered { held });
            }
        }

        PressOutcome {
            admitted: !duplicate && !inner.illegal,
            duplicate,
            illegal: inner.illegal,
        }
    }

    /// Register a release edge. Returns false for a button that was never
    /// tracked (spurious release, ignored by callers).
    pub fn release(&self, button: ButtonId) -> bool {
        let mut inner = self.lock();

        let present = inner.down.remove(&button);
        let was_illegal = inner.illegal;
        inner.illegal = inner.down.len() >= 2;

        if was_illegal && !inner.illegal {
            debug!("illegal state cleared");
            let _ = self.event_tx.send(StateEvent::IllegalStateCleared);
        }

        present
    }

    /// Atomic (members, illegal) pair for a timer's single critical section
    pub fn snapshot(&self) -> RegistrySnapshot {
        let inner = self.lock();
        RegistrySnapshot {
            held: inner.down.clone(),
            illegal: inner.illegal,
        }
    }

    /// Attach an armed session's disturbance flag to the broadcast
    pub fn attach_session(&self, button: ButtonId, disturbed: Arc<AtomicBool>) {
        self.lock().sessions.insert(button, disturbed);
    }

    /// Detach a terminal session from the broadcast
    pub fn detach_session(&self, button: ButtonId) {
        self.lock().sessions.remove(&button);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("press registry lock poisoned")
    }
}
