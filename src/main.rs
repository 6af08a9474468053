//! translatord: button-input arbiter for an offline translation appliance
//!
//! Four buttons, one speaker. Guest/User gate microphone recording with a
//! hold-to-confirm gesture; Source/Target cycle language selections and
//! announce them. This daemon owns only the decision logic: which presses
//! are legitimate, when a hold counts, and who may own the speaker. GPIO
//! edge detection, audio capture, the STT/MT/TTS pipeline, and raw playback
//! are external collaborators behind trait seams; on a development machine
//! they are replaced by the bench harness (stdin edges, stub pipeline).

mod audio;
mod button;
mod config;
mod control;
mod dispatch;
mod events;
mod harness;
mod language;
mod lifecycle;
mod session;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::audio::AudioArbiter;
use crate::button::PressRegistry;
use crate::config::Config;
use crate::control::ButtonMachine;
use crate::dispatch::ActionDispatcher;
use crate::events::StateEvent;
use crate::harness::{run_edge_injector, EchoPipeline, FileRecorder, TimedPlayback};
use crate::language::LanguageSelection;
use crate::lifecycle::ShutdownSignal;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "translatord starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.recordings_dir, ?config.clips_dir, "configuration loaded");

    // Create shutdown signal handler
    let shutdown = ShutdownSignal::new();

    // Channels: edge source -> machine, machine components -> observers
    let (edge_tx, edge_rx) = mpsc::channel(32);
    let (event_tx, _event_rx) = broadcast::channel::<StateEvent>(64);

    // Bench collaborators; on the appliance these are the GPIO/ALSA/piper
    // integrations instead
    let recorder = Arc::new(FileRecorder::new(config.recordings_dir.clone()));
    let pipeline = Arc::new(EchoPipeline);
    let playback = Arc::new(TimedPlayback {
        clip_duration: std::time::Duration::from_secs(2),
    });

    // Core components
    let registry = Arc::new(PressRegistry::new(event_tx.clone()));
    let arbiter = Arc::new(AudioArbiter::new(playback, event_tx.clone()));
    let dispatcher = Arc::new(ActionDispatcher::new(
        recorder,
        pipeline,
        Arc::clone(&arbiter),
        event_tx.clone(),
    ));
    let machine = Arc::new(ButtonMachine::new(
        registry,
        arbiter,
        dispatcher,
        LanguageSelection::default(),
        config.confirm_window,
        event_tx.clone(),
    ));

    // Mirror every transition to the log for the operator console
    let mut event_rx = event_tx.subscribe();

    info!("daemon initialized, entering main loop");
    machine.announce_startup();

    tokio::select! {
        // Run the button machine (processes debounced edges)
        _ = Arc::clone(&machine).run(edge_rx) => {
            info!("button machine exited");
        }

        // Feed edges from stdin (bench harness)
        result = run_edge_injector(edge_tx) => {
            if let Err(e) = result {
                error!(?e, "edge injector error");
            } else {
                info!("edge input closed");
            }
        }

        // Log the structured event stream
        _ = async {
            loop {
                match event_rx.recv().await {
                    Ok(event) => info!(%event, "state event"),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("event stream closed");
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    info!("translatord stopped");

    Ok(())
}
