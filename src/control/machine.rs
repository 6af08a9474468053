//! Core edge-handling machine
//!
//! Consumes debounced press/release edges, applies the admission rules
//! (illegal concurrent press, speaker ownership, degenerate language pair),
//! arms hold sessions, and schedules their one-shot confirmation timers.
//! No central poller: every hold window is an independently spawned delayed
//! task, made safe by the confirmer's generation counter.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::audio::AudioArbiter;
use crate::button::{ButtonEdge, ButtonId, CallerId, Edge, PressRegistry, RecordingChannel};
use crate::dispatch::ActionDispatcher;
use crate::events::{CancelReason, StateEvent};
use crate::language::{ClipId, LanguageRole, LanguageSelection};
use crate::session::{GestureKind, HoldConfirmer, ReleaseOutcome, TimerVerdict};

/// The four-button arbiter machine
pub struct ButtonMachine {
    registry: Arc<PressRegistry>,
    arbiter: Arc<AudioArbiter>,
    dispatcher: Arc<ActionDispatcher>,
    confirmers: [HoldConfirmer; 4],
    languages: Mutex<LanguageSelection>,
    confirm_window: Duration,
    event_tx: broadcast::Sender<StateEvent>,
}

impl ButtonMachine {
    pub fn new(
        registry: Arc<PressRegistry>,
        arbiter: Arc<AudioArbiter>,
        dispatcher: Arc<ActionDispatcher>,
        languages: LanguageSelection,
        confirm_window: Duration,
        event_tx: broadcast::Sender<StateEvent>,
    ) -> Self {
        let confirmers = ButtonId::ALL.map(|button| {
            let kind = if button.is_language_button() {
                GestureKind::CycleConfirm
            } else {
                GestureKind::PressAndHold
            };
            HoldConfirmer::new(button, kind)
        });

        Self {
            registry,
            arbiter,
            dispatcher,
            confirmers,
            languages: Mutex::new(languages),
            confirm_window,
            event_tx,
        }
    }

    /// Play the startup greeting announcing the default language pair.
    /// Any button may talk over it.
    pub fn announce_startup(&self) {
        self.dispatcher.announce(
            ClipId::default_greeting(),
            CallerId::System,
            CallerId::all_buttons(),
        );
    }

    /// Process edges until the channel closes
    pub async fn run(self: Arc<Self>, mut edge_rx: mpsc::Receiver<ButtonEdge>) {
        info!(confirm_window_ms = self.confirm_window.as_millis() as u64, "button machine started");

        while let Some(edge) = edge_rx.recv().await {
            Arc::clone(&self).handle_edge(edge);
        }

        info!("button machine stopped");
    }

    /// Handle one debounced edge
    pub fn handle_edge(self: Arc<Self>, edge: ButtonEdge) {
        match edge.edge {
            Edge::Pressed => self.on_press(edge.button),
            Edge::Released => self.on_release(edge.button),
        }
    }

    fn on_press(self: Arc<Self>, button: ButtonId) {
        let outcome = self.registry.press(button);
        debug!(%button, ?outcome, "press edge");
        let _ = self.event_tx.send(StateEvent::ButtonPressed { button });

        let confirmer = self.confirmer(button);

        if outcome.duplicate {
            // duplicate hardware edge without an intervening release:
            // invalidates the in-flight session, never restarts it
            confirmer.mark_disturbed();
            return;
        }
        if confirmer.is_armed() {
            // second press of the same button before its window resolved
            // (cycle buttons release early and press again)
            debug!(%button, "re-press while armed, session disturbed");
            confirmer.mark_disturbed();
            return;
        }
        if !outcome.admitted {
            // second-or-later concurrently held button: membership is
            // tracked for release bookkeeping, but no session starts
            debug!(%button, "press not admitted, no session armed");
            return;
        }

        let caller = CallerId::Button(button);
        if !self.arbiter.request_interrupt(caller) {
            // the speaker belongs to someone we may not interrupt;
            // abort the gesture entirely rather than queue
            info!(%button, "speaker busy, gesture aborted");
            return;
        }

        if let Some(channel) = button.recording_channel() {
            if channel == RecordingChannel::User && self.languages().is_degenerate() {
                warn!(%button, "source and target languages are identical");
                self.dispatcher
                    .announce(ClipId::error(), caller, vec![caller]);
                return;
            }
            // record optimistically from the press edge so no early audio
            // is lost; the window verdict decides the artifact's fate
            if !self.dispatcher.start_recording(channel) {
                return;
            }
        }

        let ticket = confirmer.arm(Instant::now());
        self.registry.attach_session(button, ticket.disturbed);
        let _ = self.event_tx.send(StateEvent::SessionArmed { button });

        let machine = Arc::clone(&self);
        let generation = ticket.generation;
        let window = self.confirm_window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            machine.on_timer_fire(button, generation);
        });
    }

    fn on_timer_fire(&self, button: ButtonId, generation: u64) {
        // one snapshot, one critical section: membership, illegal flag,
        // and the disturbance latch are evaluated together
        let snapshot = self.registry.snapshot();
        let confirmer = self.confirmer(button);
        let Some(verdict) = confirmer.evaluate_timer(generation, &snapshot) else {
            debug!(%button, generation, "stale hold timer ignored");
            return;
        };

        match verdict {
            TimerVerdict::Confirmed => {
                info!(%button, "hold window confirmed");
                let _ = self.event_tx.send(StateEvent::SessionConfirmed { button });
                if confirmer.kind() == GestureKind::CycleConfirm {
                    self.registry.detach_session(button);
                    self.apply_language_cycle(button);
                }
                // press-and-hold sessions act at release time
            }
            TimerVerdict::Cancelled(reason) => {
                info!(%button, ?reason, "hold window cancelled");
                let _ = self
                    .event_tx
                    .send(StateEvent::SessionCancelled { button, reason });
                if confirmer.kind() == GestureKind::CycleConfirm {
                    self.registry.detach_session(button);
                }
            }
        }
    }

    fn on_release(&self, button: ButtonId) {
        if !self.registry.release(button) {
            // hardware can deliver release-without-press after restart
            warn!(%button, "spurious release ignored");
            let _ = self.event_tx.send(StateEvent::SpuriousRelease { button });
            return;
        }
        debug!(%button, "release edge");
        let _ = self.event_tx.send(StateEvent::ButtonReleased { button });

        let Some(channel) = button.recording_channel() else {
            // cycle gestures are driven by press and timer only
            return;
        };

        let confirmer = self.confirmer(button);
        let Some(outcome) = confirmer.finish(Instant::now()) else {
            // press was blocked or never armed; nothing was recorded
            return;
        };
        self.registry.detach_session(button);

        match outcome {
            ReleaseOutcome::Confirmed { held } => {
                info!(%button, held_ms = held.as_millis() as u64, "recording confirmed");
                let (source, target) = self.languages().direction(channel);
                self.dispatcher
                    .process_recording(channel, button, source, target);
            }
            ReleaseOutcome::ReleasedEarly { held } => {
                info!(%button, held_ms = held.as_millis() as u64, "released early, recording discarded");
                let _ = self.event_tx.send(StateEvent::SessionCancelled {
                    button,
                    reason: CancelReason::ReleasedEarly,
                });
                self.dispatcher.discard_recording(channel);
            }
            ReleaseOutcome::AlreadyCancelled { held } => {
                info!(%button, held_ms = held.as_millis() as u64, "cancelled session, recording discarded");
                self.dispatcher.discard_recording(channel);
            }
        }
    }

    fn apply_language_cycle(&self, button: ButtonId) {
        let caller = CallerId::Button(button);
        let (role, code, clip) = {
            let mut languages = self.lock_languages();
            match button {
                ButtonId::Source => {
                    let (code, clip) = languages.cycle_source();
                    (LanguageRole::Source, code, clip)
                }
                ButtonId::Target => {
                    let (code, clip) = languages.cycle_target();
                    (LanguageRole::Target, code, clip)
                }
                // only cycle buttons reach here
                ButtonId::Guest | ButtonId::User => return,
            }
        };

        info!(?role, %code, %clip, "language selection advanced");
        let _ = self
            .event_tx
            .send(StateEvent::LanguageChanged { role, code });
        // self-interruptible only: a rapid re-press restarts the
        // announcement, a foreign button may not clobber it
        self.dispatcher.announce(clip, caller, vec![caller]);
    }

    /// Current selection snapshot
    pub fn languages(&self) -> LanguageSelection {
        self.lock_languages().clone()
    }

    fn confirmer(&self, button: ButtonId) -> &HoldConfirmer {
        let idx = ButtonId::ALL
            .iter()
            .position(|&b| b == button)
            .expect("button in fixed alphabet");
        &self.confirmers[idx]
    }

    fn lock_languages(&self) -> MutexGuard<'_, LanguageSelection> {
        self.languages.lock().expect("language selection lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use crate::audio::Playback;
    use crate::dispatch::test_support::{MockPipeline, MockPlayback, MockRecorder};
    use crate::dispatch::{Pipeline, Recorder};
    use crate::language::LanguageCode;

    struct Fixture {
        machine: Arc<ButtonMachine>,
        recorder: Arc<MockRecorder>,
        pipeline: Arc<MockPipeline>,
        playback: Arc<MockPlayback>,
        events: broadcast::Receiver<StateEvent>,
    }

    fn fixture() -> Fixture {
        let (event_tx, events) = broadcast::channel(256);
        let recorder = Arc::new(MockRecorder::new());
        let pipeline = Arc::new(MockPipeline::new());
        let playback = Arc::new(MockPlayback::new());
        let registry = Arc::new(PressRegistry::new(event_tx.clone()));
        let arbiter = Arc::new(AudioArbiter::new(
            Arc::clone(&playback) as Arc<dyn Playback>,
            event_tx.clone(),
        ));
        let dispatcher = Arc::new(ActionDispatcher::new(
            Arc::clone(&recorder) as Arc<dyn Recorder>,
            Arc::clone(&pipeline) as Arc<dyn Pipeline>,
            Arc::clone(&arbiter),
            event_tx.clone(),
        ));
        let machine = Arc::new(ButtonMachine::new(
            registry,
            arbiter,
            dispatcher,
            LanguageSelection::default(),
            Duration::from_secs(1),
            event_tx,
        ));
        Fixture {
            machine,
            recorder,
            pipeline,
            playback,
            events,
        }
    }

    fn press(machine: &Arc<ButtonMachine>, button: ButtonId) {
        Arc::clone(machine).handle_edge(ButtonEdge::pressed(button));
    }

    fn release(machine: &Arc<ButtonMachine>, button: ButtonId) {
        Arc::clone(machine).handle_edge(ButtonEdge::released(button));
    }

    /// Spin until `check` holds, giving the blocking pool real time
    async fn wait_until(check: impl Fn() -> bool) {
        for _ in 0..500 {
            if check() {
                return;
            }
            tokio::task::yield_now().await;
            std::thread::sleep(Duration::from_millis(1));
        }
        panic!("condition never reached");
    }

    fn drain(events: &mut broadcast::Receiver<StateEvent>) -> Vec<StateEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_hold_past_window_runs_pipeline() {
        let f = fixture();
        press(&f.machine, ButtonId::Guest);
        assert_eq!(f.recorder.starts.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(1200)).await;
        release(&f.machine, ButtonId::Guest);

        let pipeline = Arc::clone(&f.pipeline);
        wait_until(move || pipeline.processed.load(Ordering::SeqCst) == 1).await;

        assert_eq!(
            *f.pipeline.last_direction.lock().unwrap(),
            Some((LanguageCode::En, LanguageCode::De))
        );
        let playback = Arc::clone(&f.playback);
        wait_until(move || !playback.started().is_empty()).await;
        assert_eq!(f.playback.started(), vec![ClipId("tts_de".into())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_release_discards_recording() {
        let f = fixture();
        press(&f.machine, ButtonId::Guest);
        tokio::time::sleep(Duration::from_millis(500)).await;
        release(&f.machine, ButtonId::Guest);

        assert_eq!(f.recorder.discards.load(Ordering::SeqCst), 1);
        assert!(!f.recorder.is_recording(RecordingChannel::Guest));

        // the orphaned timer must be a no-op
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(f.pipeline.processed.load(Ordering::SeqCst), 0);
        assert!(f.playback.started().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_button_cancels_first_session() {
        let mut f = fixture();
        press(&f.machine, ButtonId::Source);
        tokio::time::sleep(Duration::from_millis(300)).await;

        // second press: registry goes illegal, Source session disturbed,
        // User press itself never arms
        press(&f.machine, ButtonId::User);
        assert_eq!(f.recorder.starts.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(700)).await;
        tokio::task::yield_now().await;

        // Source timer fired at t=1.0 and cancelled; languages untouched
        let sel = f.machine.languages();
        assert_eq!(sel.source(), LanguageCode::En);
        assert!(f.playback.started().is_empty());

        let events = drain(&mut f.events);
        assert!(events.iter().any(|e| matches!(
            e,
            StateEvent::SessionCancelled {
                button: ButtonId::Source,
                ..
            }
        )));
        assert!(events
            .iter()
            .any(|e| matches!(e, StateEvent::IllegalStateEntered { .. })));

        // order of releases does not matter
        release(&f.machine, ButtonId::User);
        release(&f.machine, ButtonId::Source);
        assert_eq!(f.pipeline.processed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_confirm_advances_and_announces() {
        let f = fixture();
        press(&f.machine, ButtonId::Target);
        release(&f.machine, ButtonId::Target); // release not awaited
        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(f.machine.languages().target(), LanguageCode::Zh);
        assert_eq!(f.playback.started(), vec![ClipId("t_zh".into())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_interrupt_aborts_recording_gesture() {
        let f = fixture();
        // Target confirms and its announcement occupies the speaker
        press(&f.machine, ButtonId::Target);
        release(&f.machine, ButtonId::Target);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(f.playback.started().len(), 1);

        // Guest may not interrupt a language announcement
        press(&f.machine, ButtonId::Guest);
        assert_eq!(f.recorder.starts.load(Ordering::SeqCst), 0);
        release(&f.machine, ButtonId::Guest);

        // but Target itself may (self-interrupt) and arms a new session
        press(&f.machine, ButtonId::Target);
        release(&f.machine, ButtonId::Target);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(f.machine.languages().target(), LanguageCode::En);
        assert_eq!(f.playback.started().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repress_disturbs_without_second_recording() {
        let f = fixture();
        press(&f.machine, ButtonId::Guest);
        assert_eq!(f.recorder.starts.load(Ordering::SeqCst), 1);

        // duplicate press edge without a release
        press(&f.machine, ButtonId::Guest);
        assert_eq!(f.recorder.starts.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(1200)).await;
        release(&f.machine, ButtonId::Guest);

        // disturbed at the window: artifact discarded, no pipeline call
        assert_eq!(f.recorder.discards.load(Ordering::SeqCst), 1);
        assert_eq!(f.pipeline.processed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_channel_translates_in_reverse() {
        let f = fixture();
        press(&f.machine, ButtonId::User);
        tokio::time::sleep(Duration::from_millis(1200)).await;
        release(&f.machine, ButtonId::User);

        let pipeline = Arc::clone(&f.pipeline);
        wait_until(move || pipeline.processed.load(Ordering::SeqCst) == 1).await;
        assert_eq!(
            *f.pipeline.last_direction.lock().unwrap(),
            Some((LanguageCode::De, LanguageCode::En))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_degenerate_pair_plays_error_clip() {
        let f = fixture();
        // cycle target De -> Zh -> En so it collides with the source
        for _ in 0..2 {
            press(&f.machine, ButtonId::Target);
            release(&f.machine, ButtonId::Target);
            tokio::time::sleep(Duration::from_millis(1100)).await;
            f.playback.complete_all();
            tokio::task::yield_now().await;
        }
        assert_eq!(f.machine.languages().target(), LanguageCode::En);
        assert!(f.machine.languages().is_degenerate());

        press(&f.machine, ButtonId::User);
        assert_eq!(f.recorder.starts.load(Ordering::SeqCst), 0);
        assert_eq!(
            f.playback.started().last(),
            Some(&ClipId("error".into()))
        );
        release(&f.machine, ButtonId::User);
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_greeting_is_interruptible_by_anyone() {
        let f = fixture();
        f.machine.announce_startup();
        assert_eq!(f.playback.started(), vec![ClipId("default".into())]);

        // a recording gesture may talk over the greeting
        press(&f.machine, ButtonId::Guest);
        assert_eq!(f.recorder.starts.load(Ordering::SeqCst), 1);
        release(&f.machine, ButtonId::Guest);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spurious_release_ignored() {
        let mut f = fixture();
        release(&f.machine, ButtonId::User);

        let events = drain(&mut f.events);
        assert!(events.iter().any(|e| matches!(
            e,
            StateEvent::SpuriousRelease {
                button: ButtonId::User
            }
        )));
        assert_eq!(f.recorder.discards.load(Ordering::SeqCst), 0);

        // registry state is untouched; a normal gesture still works
        press(&f.machine, ButtonId::User);
        assert_eq!(f.recorder.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_illegal_press_still_tracks_release() {
        let mut f = fixture();
        press(&f.machine, ButtonId::Guest);
        press(&f.machine, ButtonId::Source); // illegal, not armed

        release(&f.machine, ButtonId::Source);
        release(&f.machine, ButtonId::Guest);

        let events = drain(&mut f.events);
        // both releases were real, neither spurious
        assert!(!events
            .iter()
            .any(|e| matches!(e, StateEvent::SpuriousRelease { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, StateEvent::IllegalStateCleared)));

        // the whole system recovered: a fresh gesture confirms
        press(&f.machine, ButtonId::Target);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(f.machine.languages().target(), LanguageCode::Zh);
    }
}
