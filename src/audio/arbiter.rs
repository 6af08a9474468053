//! Single-playback admission and caller-scoped preemption
//!
//! Ownership, whitelist, and the active handle live under one mutex. A new
//! `play` always wins admission and terminates whatever is active;
//! `request_interrupt` is the polite path that respects the whitelist.
//! Completion is observed by a background watcher task; an epoch counter
//! bumped on every handle change keeps a finished-late watcher from
//! clobbering a newer clip's ownership.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::button::CallerId;
use crate::events::StateEvent;
use crate::language::ClipId;

/// Errors from the external playback collaborator
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("clip not found: {0}")]
    ClipNotFound(String),

    #[error("playback device unavailable: {0}")]
    Device(String),
}

/// Control handle for a clip in flight
pub trait PlaybackHandle: Send {
    /// Stop playback. Idempotent; completion still fires (or is dropped).
    fn terminate(&mut self);
}

/// A clip the collaborator has started: its control handle and a channel
/// that resolves when playback exits
pub struct StartedClip {
    pub handle: Box<dyn PlaybackHandle>,
    pub completed: oneshot::Receiver<()>,
}

/// Starts raw audio playback (external collaborator)
pub trait Playback: Send + Sync {
    fn start(&self, clip: &ClipId) -> Result<StartedClip, PlaybackError>;
}

struct Ownership {
    owner: Option<CallerId>,
    whitelist: HashSet<CallerId>,
    handle: Option<Box<dyn PlaybackHandle>>,
    /// Bumped on every handle change; guards late completion callbacks
    epoch: u64,
}

/// Owner of the shared speaker resource
pub struct AudioArbiter {
    playback: Arc<dyn Playback>,
    /// Shared with completion watcher tasks
    inner: Arc<Mutex<Ownership>>,
    event_tx: broadcast::Sender<StateEvent>,
}

impl AudioArbiter {
    pub fn new(playback: Arc<dyn Playback>, event_tx: broadcast::Sender<StateEvent>) -> Self {
        Self {
            playback,
            inner: Arc::new(Mutex::new(Ownership {
                owner: None,
                whitelist: HashSet::new(),
                handle: None,
                epoch: 0,
            })),
            event_tx,
        }
    }

    /// Start a clip for `owner`, terminating any active clip first. The new
    /// request always wins admission; callers that should defer go through
    /// `request_interrupt` before ever reaching here.
    pub fn play(&self, clip: ClipId, owner: CallerId, whitelist: Vec<CallerId>) {
        let mut inner = self.lock();

        if let Some(mut active) = inner.handle.take() {
            active.terminate();
            inner.epoch += 1;
            if let Some(previous_owner) = inner.owner.take() {
                info!(%previous_owner, %owner, "playback preempted");
                let _ = self.event_tx.send(StateEvent::PlaybackPreempted {
                    previous_owner,
                    owner,
                });
            }
        }

        let started = match self.playback.start(&clip) {
            Ok(started) => started,
            Err(e) => {
                // contained: the appliance just stays silent
                warn!(%clip, error = %e, "playback failed to start");
                inner.owner = None;
                inner.whitelist.clear();
                return;
            }
        };

        inner.owner = Some(owner);
        inner.whitelist = whitelist.into_iter().collect();
        inner.handle = Some(started.handle);
        inner.epoch += 1;
        let epoch = inner.epoch;
        drop(inner);

        info!(%clip, %owner, "playback started");
        let _ = self
            .event_tx
            .send(StateEvent::PlaybackStarted { clip, owner });

        // background watcher: the one task decoupled from the arbiter's
        // synchronous call paths
        let inner = Arc::clone(&self.inner);
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let _ = started.completed.await;
            Self::on_playback_complete(&inner, &event_tx, epoch);
        });
    }

    /// Ask to take over the speaker. Returns true (terminating the active
    /// clip) when nothing is playing or `caller` is whitelisted; false
    /// otherwise, leaving the clip running. Callers refused here must abort
    /// their gesture rather than queue.
    pub fn request_interrupt(&self, caller: CallerId) -> bool {
        let mut inner = self.lock();

        if inner.handle.is_none() {
            return true;
        }
        if !inner.whitelist.contains(&caller) {
            let owner = inner.owner.unwrap_or(CallerId::System);
            info!(%caller, %owner, "interrupt denied");
            let _ = self
                .event_tx
                .send(StateEvent::PlaybackDenied { caller, owner });
            return false;
        }

        if let Some(mut active) = inner.handle.take() {
            active.terminate();
        }
        inner.epoch += 1;
        let previous_owner = inner.owner.take();
        inner.whitelist.clear();
        drop(inner);

        if let Some(previous_owner) = previous_owner {
            debug!(%caller, %previous_owner, "active clip interrupted");
            let _ = self.event_tx.send(StateEvent::PlaybackPreempted {
                previous_owner,
                owner: caller,
            });
        }
        true
    }

    /// Current clip owner, if any
    pub fn current_owner(&self) -> Option<CallerId> {
        self.lock().owner
    }

    /// Whether a clip is active right now
    pub fn is_active(&self) -> bool {
        self.lock().handle.is_some()
    }

    fn on_playback_complete(
        inner: &Mutex<Ownership>,
        event_tx: &broadcast::Sender<StateEvent>,
        epoch: u64,
    ) {
        let mut inner = inner.lock().expect("audio ownership lock poisoned");
        if inner.epoch != epoch {
            // a newer clip replaced this one before its watcher woke up
            return;
        }
        inner.handle = None;
        inner.whitelist.clear();
        let owner = inner.owner.take();
        drop(inner);

        if let Some(owner) = owner {
            debug!(%owner, "playback completed");
            let _ = event_tx.send(StateEvent::PlaybackCompleted { owner });
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ownership> {
        self.inner.lock().expect("audio ownership lock poisoned")
    }
}
