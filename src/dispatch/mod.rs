//! Action dispatch: the only component that calls past the core boundary
//!
//! Routes confirmed recording sessions into the transcribe → translate →
//! synthesize pipeline and confirmation clips into the audio arbiter.
//! Collaborator failures are contained here; nothing propagates back into
//! the button-handling loop, since the device has no feedback channel other
//! than the speaker itself.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::audio::AudioArbiter;
use crate::button::{ButtonId, CallerId, RecordingChannel};
use crate::events::StateEvent;
use crate::language::{ClipId, LanguageCode};

/// Opaque handle to a captured recording (a WAV file on the appliance)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHandle(pub PathBuf);

/// Errors from the external recorder collaborator
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("channel {0} is already recording")]
    AlreadyRecording(RecordingChannel),

    #[error("channel {0} is not recording")]
    NotRecording(RecordingChannel),

    #[error("capture device error: {0}")]
    Device(String),
}

/// Errors from the external transcription/translation/synthesis pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("translation failed: {0}")]
    Translation(String),

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),
}

/// Per-channel microphone capture (external collaborator)
pub trait Recorder: Send + Sync {
    fn start(&self, channel: RecordingChannel) -> Result<(), RecorderError>;
    fn stop(&self, channel: RecordingChannel) -> Result<ArtifactHandle, RecorderError>;
    /// Delete an artifact that will never enter the pipeline
    fn discard(&self, artifact: ArtifactHandle) -> Result<(), RecorderError>;
}

/// Transcribe, translate, and synthesize a recording into a playable clip
/// (external collaborator; blocking, potentially seconds of work)
pub trait Pipeline: Send + Sync {
    fn process(
        &self,
        artifact: ArtifactHandle,
        source: LanguageCode,
        target: LanguageCode,
    ) -> Result<ClipId, PipelineError>;
}

/// Stateless glue between confirmed sessions and the external collaborators
pub struct ActionDispatcher {
    recorder: Arc<dyn Recorder>,
    pipeline: Arc<dyn Pipeline>,
    arbiter: Arc<AudioArbiter>,
    event_tx: broadcast::Sender<StateEvent>,
}

impl ActionDispatcher {
    pub fn new(
        recorder: Arc<dyn Recorder>,
        pipeline: Arc<dyn Pipeline>,
        arbiter: Arc<AudioArbiter>,
        event_tx: broadcast::Sender<StateEvent>,
    ) -> Self {
        Self {
            recorder,
            pipeline,
            arbiter,
            event_tx,
        }
    }

    /// Start capturing on a channel. Returns false if the recorder refused;
    /// the caller's session should then not proceed.
    pub fn start_recording(&self, channel: RecordingChannel) -> bool {
        match self.recorder.start(channel) {
            Ok(()) => {
                info!(%channel, "recording started");
                let _ = self
                    .event_tx
                    .send(StateEvent::RecordingStarted { channel });
                true
            }
            Err(e) => {
                error!(%channel, error = %e, "recorder failed to start");
                false
            }
        }
    }

    /// Stop capturing and delete the artifact (cancelled session)
    pub fn discard_recording(&self, channel: RecordingChannel) {
        let artifact = match self.recorder.stop(channel) {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(%channel, error = %e, "recorder failed to stop");
                return;
            }
        };
        if let Err(e) = self.recorder.discard(artifact) {
            warn!(%channel, error = %e, "failed to discard recording");
        }
        info!(%channel, "recording discarded");
        let _ = self
            .event_tx
            .send(StateEvent::RecordingDiscarded { channel });
    }

    /// Stop capturing and run the artifact through the pipeline, then play
    /// the synthesized translation. The pipeline runs on a blocking task;
    /// its failures are logged and surfaced as events, never propagated.
    pub fn process_recording(
        &self,
        channel: RecordingChannel,
        button: ButtonId,
        source: LanguageCode,
        target: LanguageCode,
    ) {
        let artifact = match self.recorder.stop(channel) {
            Ok(artifact) => artifact,
            Err(e) => {
                error!(%channel, error = %e, "recorder failed to stop");
                return;
            }
        };

        info!(%channel, %source, %target, ?artifact, "recording handed to pipeline");
        let pipeline = Arc::clone(&self.pipeline);
        let arbiter = Arc::clone(&self.arbiter);
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let result =
                tokio::task::spawn_blocking(move || pipeline.process(artifact, source, target))
                    .await;

            match result {
                Ok(Ok(clip)) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    info!(%channel, %clip, duration_ms, "pipeline completed");
                    let _ = event_tx.send(StateEvent::PipelineCompleted {
                        channel,
                        duration_ms,
                    });
                    arbiter.play(clip, CallerId::Button(button), CallerId::all_buttons());
                }
                Ok(Err(e)) => {
                    error!(%channel, error = %e, "pipeline failed, no clip played");
                    let _ = event_tx.send(StateEvent::PipelineFailed {
                        channel,
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    error!(%channel, error = %e, "pipeline task panicked");
                    let _ = event_tx.send(StateEvent::PipelineFailed {
                        channel,
                        error: format!("pipeline task panicked: {e}"),
                    });
                }
            }
        });
    }

    /// Play a confirmation, greeting, or error clip through the arbiter
    pub fn announce(&self, clip: ClipId, owner: CallerId, whitelist: Vec<CallerId>) {
        self.arbiter.play(clip, owner, whitelist);
    }

    #[cfg(test)]
    fn arbiter(&self) -> &Arc<AudioArbiter> {
        &self.arbiter
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use std::sync::atomic::Ordering;

    use crate::audio::Playback;

    fn setup() -> (
        Arc<ActionDispatcher>,
        Arc<MockRecorder>,
        Arc<MockPipeline>,
        Arc<MockPlayback>,
    ) {
        let (tx, _rx) = broadcast::channel(64);
        let recorder = Arc::new(MockRecorder::new());
        let pipeline = Arc::new(MockPipeline::new());
        let playback = Arc::new(MockPlayback::new());
        let arbiter = Arc::new(AudioArbiter::new(
            Arc::clone(&playback) as Arc<dyn Playback>,
            tx.clone(),
        ));
        let dispatcher = Arc::new(ActionDispatcher::new(
            Arc::clone(&recorder) as Arc<dyn Recorder>,
            Arc::clone(&pipeline) as Arc<dyn Pipeline>,
            arbiter,
            tx,
        ));
        (dispatcher, recorder, pipeline, playback)
    }

    #[tokio::test]
    async fn test_start_and_discard() {
        let (dispatcher, recorder, _pipeline, _playback) = setup();
        assert!(dispatcher.start_recording(RecordingChannel::Guest));
        assert!(recorder.is_recording(RecordingChannel::Guest));

        dispatcher.discard_recording(RecordingChannel::Guest);
        assert!(!recorder.is_recording(RecordingChannel::Guest));
        assert_eq!(recorder.discards.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_double_start_refused() {
        let (dispatcher, _recorder, _pipeline, _playback) = setup();
        assert!(dispatcher.start_recording(RecordingChannel::User));
        assert!(!dispatcher.start_recording(RecordingChannel::User));
    }

    #[tokio::test]
    async fn test_process_plays_synthesized_clip() {
        let (dispatcher, recorder, pipeline, playback) = setup();
        dispatcher.start_recording(RecordingChannel::Guest);
        dispatcher.process_recording(
            RecordingChannel::Guest,
            ButtonId::Guest,
            LanguageCode::En,
            LanguageCode::De,
        );

        // let the pipeline task and blocking pool run
        for _ in 0..10 {
            tokio::task::yield_now().await;
            if pipeline.processed.load(Ordering::SeqCst) > 0 && !playback.started().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        assert!(!recorder.is_recording(RecordingChannel::Guest));
        assert_eq!(
            *pipeline.last_direction.lock().unwrap(),
            Some((LanguageCode::En, LanguageCode::De))
        );
        assert_eq!(playback.started(), vec![ClipId("tts_de".into())]);
    }

    #[tokio::test]
    async fn test_pipeline_failure_is_contained() {
        let (dispatcher, _recorder, pipeline, playback) = setup();
        pipeline.fail.store(true, Ordering::SeqCst);

        dispatcher.start_recording(RecordingChannel::User);
        dispatcher.process_recording(
            RecordingChannel::User,
            ButtonId::User,
            LanguageCode::De,
            LanguageCode::En,
        );

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // failure logged, nothing played, dispatcher still usable
        assert!(playback.started().is_empty());
        assert!(dispatcher.start_recording(RecordingChannel::User));
    }

    #[tokio::test]
    async fn test_announce_routes_to_arbiter() {
        let (dispatcher, _recorder, _pipeline, playback) = setup();
        dispatcher.announce(
            ClipId("t_de".into()),
            CallerId::Button(ButtonId::Target),
            vec![CallerId::Button(ButtonId::Target)],
        );
        assert_eq!(playback.started(), vec![ClipId("t_de".into())]);
        assert!(dispatcher.arbiter().is_active());
    }
}
