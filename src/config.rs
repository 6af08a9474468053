//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Default hold-to-confirm window, matching the appliance's buttons
const DEFAULT_CONFIRM_WINDOW_MS: u64 = 1000;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Hold duration a gesture must survive before it takes effect
    pub confirm_window: Duration,

    /// Directory for captured recordings
    pub recordings_dir: PathBuf,

    /// Directory holding the pre-recorded confirmation clips
    pub clips_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME").context("HOME not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("translatord");

        let confirm_window_ms = match std::env::var("TRANSLATORD_CONFIRM_WINDOW_MS") {
            Ok(raw) => raw
                .parse::<u64>()
                .context("TRANSLATORD_CONFIRM_WINDOW_MS must be an integer")?,
            Err(_) => DEFAULT_CONFIRM_WINDOW_MS,
        };

        Ok(Self {
            confirm_window: Duration::from_millis(confirm_window_ms),
            recordings_dir: data_dir.join("recordings"),
            clips_dir: data_dir.join("languages"),
        })
    }

    /// Ensure data directories exist
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.recordings_dir)?;
        std::fs::create_dir_all(&self.clips_dir)?;
        Ok(())
    }
}
