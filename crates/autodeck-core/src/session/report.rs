//! Session report persistence
//!
//! Written as pretty JSON when a session ends or aborts, one file per session:
//! `<session_log_dir>/session-<YYYYmmdd-HHMMSS>-<genre>.json`.

use super::events::SessionEvent;
use super::state::{SessionPhase, SessionState};
use crate::types::TrackId;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::time::Instant;

/// Final state and decision trail of one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub genre: String,
    pub target_minutes: f64,
    pub final_phase: SessionPhase,
    pub tracks_played: u32,
    pub history: Vec<TrackId>,
    pub duration_secs: f64,
    pub finished_at: DateTime<Local>,
    pub events: Vec<SessionEvent>,
}

impl SessionReport {
    pub(crate) fn from_state(state: &SessionState) -> Self {
        Self {
            genre: state.genre.clone(),
            target_minutes: state.target.as_secs_f64() / 60.0,
            final_phase: state.phase,
            tracks_played: state.tracks_played,
            history: state.history.clone(),
            duration_secs: state.elapsed(Instant::now()).as_secs_f64(),
            finished_at: Local::now(),
            events: state.events.snapshot(),
        }
    }

    /// Write the report into `dir`, returning the file path
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create session log directory {:?}", dir))?;

        let name = format!(
            "session-{}-{}.json",
            self.finished_at.format("%Y%m%d-%H%M%S"),
            self.genre.to_lowercase().replace(|c: char| !c.is_ascii_alphanumeric(), "_")
        );
        let path = dir.join(name);
        let json = serde_json::to_string_pretty(self).context("Failed to serialize session report")?;
        std::fs::write(&path, json).with_context(|| format!("Failed to write {:?}", path))?;

        log::info!("SessionReport::save: Wrote {:?}", path);
        Ok(path)
    }

    /// Read a previously saved report
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        serde_json::from_str(&contents).with_context(|| format!("Failed to parse {:?}", path))
    }
}
