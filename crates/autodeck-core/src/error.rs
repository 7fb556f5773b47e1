//! Session error types
//!
//! Per-component errors live with their component (`DeviceError`,
//! `NavigationError`, `DecisionError`, `CatalogError`, `ConfigError`). The
//! types here describe how those failures surface at the session level.

use crate::config::ConfigError;
use crate::device::DeviceError;
use crate::navigation::NavigationError;
use crate::types::DeckId;

/// A deck load that the safety checks refused or the device dropped
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoadError {
    #[error("Deck {0} is still playing")]
    DeckPlaying(DeckId),

    #[error("Deck {0} is the audible deck")]
    DeckActive(DeckId),

    #[error("Device failure while loading: {0}")]
    Device(#[from] DeviceError),
}

/// Why a load cycle (initial or next-track) did not complete
///
/// All of these are absorbed by the session during `LoadingNext`; during
/// `Initializing` they become [`SessionError::FatalInitialization`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CycleError {
    #[error("Navigation failed: {0}")]
    Navigation(#[from] NavigationError),

    #[error("Load failed: {0}")]
    Load(#[from] LoadError),

    #[error("No compatible track found in genre '{genre}'")]
    NoCompatibleTrack { genre: String },
}

/// Errors surfaced by the session control surface
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("A session is already running")]
    AlreadyRunning,

    #[error("No session is running")]
    NotRunning,

    #[error("Unknown genre '{0}'")]
    UnknownGenre(String),

    #[error("Invalid session duration: {0} minutes")]
    InvalidDuration(f64),

    #[error("Session could not start: {0}")]
    FatalInitialization(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Session task failed: {0}")]
    Task(String),
}
