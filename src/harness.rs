//! Bench-test collaborators and the stdin edge injector
//!
//! The real appliance wires GPIO edges, ALSA capture, and the
//! whisper/argos/piper pipeline into the core. On a development machine
//! none of that exists, so the daemon runs against these stand-ins: edges
//! are typed on stdin (`press guest`, `release target`, ...), recordings
//! become empty placeholder files, the pipeline echoes a synthetic clip id,
//! and playback is a timed no-op. Every decision still flows through the
//! real registry, confirmers, arbiter, and dispatcher.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::audio::{Playback, PlaybackError, PlaybackHandle, StartedClip};
use crate::button::{ButtonEdge, ButtonId, Edge, RecordingChannel};
use crate::dispatch::{ArtifactHandle, Pipeline, PipelineError, Recorder, RecorderError};
use crate::language::{ClipId, LanguageCode};

/// Recorder that writes empty placeholder WAV files
pub struct FileRecorder {
    dir: PathBuf,
    active: Mutex<Vec<(RecordingChannel, ArtifactHandle)>>,
}

impl FileRecorder {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            active: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(RecordingChannel, ArtifactHandle)>> {
        self.active.lock().expect("recorder state lock poisoned")
    }
}

impl Recorder for FileRecorder {
    fn start(&self, channel: RecordingChannel) -> Result<(), RecorderError> {
        let mut active = self.lock();
        if active.iter().any(|(c, _)| *c == channel) {
            return Err(RecorderError::AlreadyRecording(channel));
        }
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let path = self.dir.join(format!("{channel}_{stamp}.wav"));
        std::fs::write(&path, b"").map_err(|e| RecorderError::Device(e.to_string()))?;
        active.push((channel, ArtifactHandle(path)));
        Ok(())
    }

    fn stop(&self, channel: RecordingChannel) -> Result<ArtifactHandle, RecorderError> {
        let mut active = self.lock();
        let idx = active
            .iter()
            .position(|(c, _)| *c == channel)
            .ok_or(RecorderError::NotRecording(channel))?;
        Ok(active.remove(idx).1)
    }

    fn discard(&self, artifact: ArtifactHandle) -> Result<(), RecorderError> {
        std::fs::remove_file(&artifact.0).map_err(|e| RecorderError::Device(e.to_string()))
    }
}

/// Pipeline that skips STT/MT/TTS and echoes a synthetic clip id
pub struct EchoPipeline;

impl Pipeline for EchoPipeline {
    fn process(
        &self,
        artifact: ArtifactHandle,
        source: LanguageCode,
        target: LanguageCode,
    ) -> Result<ClipId, PipelineError> {
        info!(?artifact, %source, %target, "echo pipeline invoked");
        Ok(ClipId(format!("tts_{target}")))
    }
}

/// Playback that "plays" each clip for a fixed wall-clock duration
pub struct TimedPlayback {
    pub clip_duration: Duration,
}

struct TimedHandle {
    task: tokio::task::JoinHandle<()>,
}

impl PlaybackHandle for TimedHandle {
    fn terminate(&mut self) {
        self.task.abort();
    }
}

impl Playback for TimedPlayback {
    fn start(&self, clip: &ClipId) -> Result<StartedClip, PlaybackError> {
        info!(%clip, "playback (timed stub)");
        let (tx, rx) = oneshot::channel();
        let duration = self.clip_duration;
        let task = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = tx.send(());
        });
        Ok(StartedClip {
            handle: Box::new(TimedHandle { task }),
            completed: rx,
        })
    }
}

fn parse_button(word: &str) -> Option<ButtonId> {
    match word {
        "guest" | "1" => Some(ButtonId::Guest),
        "user" | "2" => Some(ButtonId::User),
        "source" | "3" => Some(ButtonId::Source),
        "target" | "4" => Some(ButtonId::Target),
        _ => None,
    }
}

fn parse_line(line: &str) -> Option<ButtonEdge> {
    let mut words = line.split_whitespace();
    let verb = match words.next()? {
        "press" | "p" => Edge::Pressed,
        "release" | "r" => Edge::Released,
        _ => return None,
    };
    let button = parse_button(words.next()?)?;
    Some(ButtonEdge { button, edge: verb })
}

/// Read edges from stdin until EOF and feed them to the machine
pub async fn run_edge_injector(edge_tx: mpsc::Sender<ButtonEdge>) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    info!("edge injector ready: `press <guest|user|source|target>` / `release <...>`");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_lowercase();
        if line.is_empty() {
            continue;
        }
        match parse_line(&line) {
            Some(edge) => {
                if edge_tx.send(edge).await.is_err() {
                    break;
                }
            }
            None => warn!(%line, "unrecognized command"),
        }
    }
    Ok(())
}
