//! In-process model of the controlled application
//!
//! Applies commands to a browse cursor and mixer state the way the real
//! application does: moves past either end of a list are ignored, `collapse`
//! at the root is ignored. Used to check that believed positions match what
//! the device would actually show.

use super::{CommandChannel, DeviceCommand, DeviceError, RecordingChannel};
use crate::catalog::FolderNode;
use crate::types::{DeckId, EqBand};
use std::sync::Mutex;

/// Observable state of a [`SimulatedDevice`]
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedState {
    /// Folders currently open, as sibling indices from the root
    pub folder_path: Vec<usize>,
    /// Highlighted row in the current list
    pub index: usize,
    /// Cursor captured by the last load on each deck
    pub loaded: [Option<(Vec<usize>, usize)>; 2],
    pub playing: [bool; 2],
    pub volume: [f32; 2],
    pub eq: [[f32; 3]; 2],
    pub crossfader: f32,
}

impl Default for SimulatedState {
    fn default() -> Self {
        Self {
            folder_path: Vec::new(),
            index: 0,
            loaded: [None, None],
            playing: [false; 2],
            volume: [1.0; 2],
            eq: [[0.5; 3]; 2],
            crossfader: 0.5,
        }
    }
}

/// Command channel backed by a simulated browse tree and mixer
pub struct SimulatedDevice {
    tree: Vec<FolderNode>,
    /// Number of track rows in every leaf folder
    track_rows: usize,
    state: Mutex<SimulatedState>,
    recorder: RecordingChannel,
}

impl SimulatedDevice {
    /// Create a device showing `tree`, cursor at the root
    pub fn new(tree: Vec<FolderNode>, track_rows: usize) -> Self {
        Self {
            tree,
            track_rows: track_rows.max(1),
            state: Mutex::new(SimulatedState::default()),
            recorder: RecordingChannel::new(),
        }
    }

    /// Start from an arbitrary cursor (e.g. left there by a human)
    pub fn with_cursor(self, folder_path: Vec<usize>, index: usize) -> Self {
        {
            let mut state = self.lock();
            state.folder_path = folder_path;
            state.index = index;
        }
        self
    }

    /// Snapshot of the current state
    pub fn state(&self) -> SimulatedState {
        self.lock().clone()
    }

    /// Recorder holding every accepted command
    pub fn recorder(&self) -> &RecordingChannel {
        &self.recorder
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Folders listed at the given open path (empty for a leaf folder)
    fn rows_at(&self, path: &[usize]) -> Option<&[FolderNode]> {
        let mut level: &[FolderNode] = &self.tree;
        for &i in path {
            level = &level.get(i)?.children;
        }
        Some(level)
    }

    fn apply(&self, command: &DeviceCommand) {
        let mut state = self.lock();
        let folders = self
            .rows_at(&state.folder_path)
            .map(|rows| rows.len())
            .unwrap_or(0);
        let in_track_list = folders == 0 && !state.folder_path.is_empty();

        match *command {
            DeviceCommand::FolderAdvance => {
                if folders > 0 && state.index + 1 < folders {
                    state.index += 1;
                }
            }
            DeviceCommand::FolderRetreat => {
                if folders > 0 {
                    state.index = state.index.saturating_sub(1);
                }
            }
            DeviceCommand::Expand => {
                if state.index < folders {
                    let index = state.index;
                    state.folder_path.push(index);
                    state.index = 0;
                }
            }
            DeviceCommand::Collapse => {
                if let Some(parent_index) = state.folder_path.pop() {
                    state.index = parent_index;
                }
            }
            DeviceCommand::TrackAdvance => {
                if in_track_list && state.index + 1 < self.track_rows {
                    state.index += 1;
                }
            }
            DeviceCommand::TrackRetreat => {
                if in_track_list {
                    state.index = state.index.saturating_sub(1);
                }
            }
            DeviceCommand::LoadDeck { deck } => {
                if in_track_list {
                    state.loaded[deck.index()] = Some((state.folder_path.clone(), state.index));
                }
            }
            DeviceCommand::PlayToggle { deck } => {
                state.playing[deck.index()] = !state.playing[deck.index()];
            }
            DeviceCommand::SetVolume { deck, level } => {
                state.volume[deck.index()] = level.clamp(0.0, 1.0);
            }
            DeviceCommand::SetCrossfader { position } => {
                state.crossfader = position.clamp(0.0, 1.0);
            }
            DeviceCommand::SetEq { deck, band, level } => {
                let band_index = match band {
                    EqBand::Low => 0,
                    EqBand::Mid => 1,
                    EqBand::High => 2,
                };
                state.eq[deck.index()][band_index] = level.clamp(0.0, 1.0);
            }
        }
    }
}

impl CommandChannel for SimulatedDevice {
    fn send(&self, command: &DeviceCommand) -> Result<(), DeviceError> {
        self.recorder.send(command)?;
        self.apply(command);
        Ok(())
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

impl SimulatedState {
    /// Whether the given deck is believed playing on the device
    pub fn is_playing(&self, deck: DeckId) -> bool {
        self.playing[deck.index()]
    }
}
