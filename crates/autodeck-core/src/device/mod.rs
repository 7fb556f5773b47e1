//! Device command channel
//!
//! The controlled DJ application is driven through a small vocabulary of
//! relative, fire-and-forget commands. Nothing is ever read back: a successful
//! [`CommandChannel::send`] only means the bytes left this process.
//!
//! Protocol-specific channels (MIDI lives in `autodeck-midi`) implement
//! [`CommandChannel`]. This module also carries the channels used for dry runs
//! and tests.

mod simulated;

pub use simulated::{SimulatedDevice, SimulatedState};

use crate::types::{DeckId, EqBand};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// One command understood by the controlled application
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum DeviceCommand {
    /// Highlight the next folder in the browse tree
    FolderAdvance,
    /// Highlight the previous folder in the browse tree
    FolderRetreat,
    /// Highlight the next track in the open folder
    TrackAdvance,
    /// Highlight the previous track in the open folder
    TrackRetreat,
    /// Open the highlighted folder
    Expand,
    /// Close the current folder, returning to its parent
    Collapse,
    /// Load the highlighted track onto a deck
    LoadDeck { deck: DeckId },
    /// Toggle play/pause on a deck
    PlayToggle { deck: DeckId },
    /// Channel volume (0.0-1.0)
    SetVolume { deck: DeckId, level: f32 },
    /// Crossfader position (0.0 = deck A, 1.0 = deck B)
    SetCrossfader { position: f32 },
    /// EQ band gain (0.5 = neutral)
    SetEq { deck: DeckId, band: EqBand, level: f32 },
}

/// Groups of commands that share a device processing latency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandClass {
    /// Folder-level browse moves (tree redraws are slow)
    FolderMove,
    /// In-folder browse moves
    TrackMove,
    /// Deck loads (file decode on the device side)
    Load,
    /// Play/pause
    Transport,
    /// Volume, crossfader and EQ
    Mixer,
}

impl DeviceCommand {
    /// Latency class of this command
    pub fn class(&self) -> CommandClass {
        match self {
            DeviceCommand::FolderAdvance
            | DeviceCommand::FolderRetreat
            | DeviceCommand::Expand
            | DeviceCommand::Collapse => CommandClass::FolderMove,
            DeviceCommand::TrackAdvance | DeviceCommand::TrackRetreat => CommandClass::TrackMove,
            DeviceCommand::LoadDeck { .. } => CommandClass::Load,
            DeviceCommand::PlayToggle { .. } => CommandClass::Transport,
            DeviceCommand::SetVolume { .. }
            | DeviceCommand::SetCrossfader { .. }
            | DeviceCommand::SetEq { .. } => CommandClass::Mixer,
        }
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceCommand::FolderAdvance => write!(f, "folder-advance"),
            DeviceCommand::FolderRetreat => write!(f, "folder-retreat"),
            DeviceCommand::TrackAdvance => write!(f, "track-advance"),
            DeviceCommand::TrackRetreat => write!(f, "track-retreat"),
            DeviceCommand::Expand => write!(f, "expand"),
            DeviceCommand::Collapse => write!(f, "collapse"),
            DeviceCommand::LoadDeck { deck } => write!(f, "load-deck({})", deck),
            DeviceCommand::PlayToggle { deck } => write!(f, "play-toggle({})", deck),
            DeviceCommand::SetVolume { deck, level } => write!(f, "set-volume({}, {:.2})", deck, level),
            DeviceCommand::SetCrossfader { position } => write!(f, "set-crossfader({:.2})", position),
            DeviceCommand::SetEq { deck, band, level } => {
                write!(f, "set-eq({}, {:?}, {:.2})", deck, band, level)
            }
        }
    }
}

/// Error type for command channel operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("Device channel is not connected")]
    Disconnected,

    #[error("Failed to send '{command}': {reason}")]
    SendFailed { command: String, reason: String },
}

/// Send-only transport to the controlled application
///
/// Implementations must not block for longer than it takes to hand the
/// message to the OS. Pacing between commands is the caller's job.
pub trait CommandChannel: Send + Sync {
    /// Send one command; no acknowledgment is available
    fn send(&self, command: &DeviceCommand) -> Result<(), DeviceError>;

    /// Human-readable channel name for logs
    fn name(&self) -> &str {
        "device"
    }
}

impl<C: CommandChannel + ?Sized> CommandChannel for Arc<C> {
    fn send(&self, command: &DeviceCommand) -> Result<(), DeviceError> {
        (**self).send(command)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Channel that only logs commands (dry runs)
#[derive(Debug, Default)]
pub struct LoggingChannel;

impl CommandChannel for LoggingChannel {
    fn send(&self, command: &DeviceCommand) -> Result<(), DeviceError> {
        log::info!("[DRY RUN] {}", command);
        Ok(())
    }

    fn name(&self) -> &str {
        "dry-run"
    }
}

/// Channel that captures every command it is asked to send
///
/// Cloning shares the underlying record. Can be told to start failing after a
/// number of successful sends to emulate a device that went away. Each
/// command is stamped with the (tokio) time it was accepted.
#[derive(Debug, Clone)]
pub struct RecordingChannel {
    commands: Arc<Mutex<Vec<(Instant, DeviceCommand)>>>,
    fail_after: Arc<AtomicUsize>,
}

impl RecordingChannel {
    /// Create an empty, always-succeeding recorder
    pub fn new() -> Self {
        Self {
            commands: Arc::default(),
            fail_after: Arc::new(AtomicUsize::new(usize::MAX)),
        }
    }

    /// Fail every send once `count` more commands have been accepted
    pub fn fail_after(&self, count: usize) {
        let already = self.len();
        self.fail_after.store(already.saturating_add(count), Ordering::SeqCst);
    }

    /// Accept all sends again
    pub fn recover(&self) {
        self.fail_after.store(usize::MAX, Ordering::SeqCst);
    }

    /// Snapshot of recorded commands
    pub fn commands(&self) -> Vec<DeviceCommand> {
        self.lock().iter().map(|(_, c)| *c).collect()
    }

    /// Snapshot of recorded commands with their send times
    pub fn timed_commands(&self) -> Vec<(Instant, DeviceCommand)> {
        self.lock().clone()
    }

    /// Number of recorded commands
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forget recorded commands
    pub fn clear(&self) {
        self.lock().clear();
        self.recover();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(Instant, DeviceCommand)>> {
        // A poisoned record is still a valid record
        self.commands.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for RecordingChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandChannel for RecordingChannel {
    fn send(&self, command: &DeviceCommand) -> Result<(), DeviceError> {
        let mut commands = self.lock();
        if commands.len() >= self.fail_after.load(Ordering::SeqCst) {
            return Err(DeviceError::SendFailed {
                command: command.to_string(),
                reason: "device unresponsive".to_string(),
            });
        }
        commands.push((Instant::now(), *command));
        Ok(())
    }

    fn name(&self) -> &str {
        "recorder"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_classes() {
        assert_eq!(DeviceCommand::Expand.class(), CommandClass::FolderMove);
        assert_eq!(DeviceCommand::TrackRetreat.class(), CommandClass::TrackMove);
        assert_eq!(DeviceCommand::LoadDeck { deck: DeckId::B }.class(), CommandClass::Load);
        assert_eq!(
            DeviceCommand::SetCrossfader { position: 0.5 }.class(),
            CommandClass::Mixer
        );
    }

    #[test]
    fn test_recorder_fails_after_budget() {
        let channel = RecordingChannel::new();
        channel.send(&DeviceCommand::FolderAdvance).unwrap();
        channel.fail_after(1);
        channel.send(&DeviceCommand::FolderAdvance).unwrap();
        assert!(matches!(
            channel.send(&DeviceCommand::Expand),
            Err(DeviceError::SendFailed { .. })
        ));
        assert_eq!(channel.len(), 2);

        channel.recover();
        channel.send(&DeviceCommand::Expand).unwrap();
        assert_eq!(channel.len(), 3);
    }

    #[test]
    fn test_display_uses_protocol_names() {
        assert_eq!(DeviceCommand::FolderRetreat.to_string(), "folder-retreat");
        assert_eq!(
            DeviceCommand::PlayToggle { deck: DeckId::A }.to_string(),
            "play-toggle(A)"
        );
    }
}
