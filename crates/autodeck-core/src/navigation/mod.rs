//! Blind browse navigation
//!
//! The controlled application exposes its browse tree as a cursor that only
//! moves relatively, and never reports where it is. The controller therefore
//! keeps a *believed* [`BrowsePosition`] and reaches every target by first
//! re-homing to the root with a fixed, over-sized burst of "move out" commands,
//! then walking down with one relative command per step.
//!
//! ```text
//!   reset:   collapse × (max_depth + 1), folder-retreat × (max_breadth + 1)
//!   descend: folder-advance × idx, expand          (per path level)
//!   select:  track-advance × index
//! ```
//!
//! Every command is paced by [`DeviceLink`], which sleeps for the settle delay
//! of the command's class after each send.

use crate::catalog::Catalog;
use crate::config::{NavigationConfig, SettleDelays};
use crate::device::{CommandChannel, DeviceCommand, DeviceError};
use crate::types::BrowseLocation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// How far the believed position can be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Just re-homed; the device is at the origin
    Certain,
    /// Derived from relative moves since the last re-home
    Estimated,
    /// Known or suspected to differ from the device
    Suspect,
}

/// Believed cursor position in the device's browse tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowsePosition {
    /// Open folders as sibling indices from the root
    pub folder_path: Vec<usize>,
    /// Highlighted row in the current list
    pub index: usize,
    pub confidence: Confidence,
}

impl BrowsePosition {
    /// Root of the hierarchy, first row highlighted
    pub fn origin() -> Self {
        Self {
            folder_path: Vec::new(),
            index: 0,
            confidence: Confidence::Certain,
        }
    }

    /// Check if this is the origin (regardless of confidence)
    pub fn is_origin(&self) -> bool {
        self.folder_path.is_empty() && self.index == 0
    }
}

impl fmt::Display for BrowsePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}[{}] ({:?})", self.folder_path, self.index, self.confidence)
    }
}

/// Error type for navigation operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NavigationError {
    #[error("Unknown navigation target: {0}")]
    UnknownTarget(String),

    #[error("Target {0} is outside the navigable bounds")]
    OutOfBounds(String),

    #[error("Device failure during navigation: {0}")]
    Device(#[from] DeviceError),
}

/// Paced, single-writer access to the command channel
///
/// Owned by exactly one task. Every command is followed by the settle delay of
/// its class; there is no way to send without waiting.
pub struct DeviceLink {
    channel: Arc<dyn CommandChannel>,
    settle: SettleDelays,
    sent: u64,
}

impl DeviceLink {
    pub fn new(channel: Arc<dyn CommandChannel>, settle: SettleDelays) -> Self {
        Self {
            channel,
            settle,
            sent: 0,
        }
    }

    /// Send one command and wait for the device to process it
    pub async fn send(&mut self, command: DeviceCommand) -> Result<(), DeviceError> {
        log::debug!("[{}] -> {}", self.channel.name(), command);
        self.channel.send(&command)?;
        self.sent += 1;
        tokio::time::sleep(self.settle.for_class(command.class())).await;
        Ok(())
    }

    /// Send the same command `count` times
    pub async fn repeat(&mut self, command: DeviceCommand, count: usize) -> Result<(), DeviceError> {
        for _ in 0..count {
            self.send(command).await?;
        }
        Ok(())
    }

    /// Commands successfully handed to the channel so far
    pub fn commands_sent(&self) -> u64 {
        self.sent
    }

    pub fn settle(&self) -> &SettleDelays {
        &self.settle
    }

    pub fn channel_name(&self) -> &str {
        self.channel.name()
    }
}

/// Dead-reckoning navigator over the device's browse tree
#[derive(Debug, Clone)]
pub struct NavigationController {
    position: BrowsePosition,
    bounds: NavigationConfig,
}

impl NavigationController {
    /// New controller; the device cursor is unknown until the first re-home
    pub fn new(bounds: NavigationConfig) -> Self {
        Self {
            position: BrowsePosition {
                confidence: Confidence::Suspect,
                ..BrowsePosition::origin()
            },
            bounds,
        }
    }

    /// Current believed position
    pub fn position(&self) -> &BrowsePosition {
        &self.position
    }

    /// Number of commands every re-home emits
    pub fn reset_command_count(&self) -> usize {
        (self.bounds.max_depth + 1) + (self.bounds.max_breadth + 1)
    }

    /// Record that the device may have drifted from the believed position
    ///
    /// Nothing is sent; the next folder-level move re-homes anyway, and
    /// [`rehome`](Self::rehome) can be called to do it immediately.
    pub fn mark_suspect(&mut self) {
        if self.position.confidence != Confidence::Suspect {
            log::warn!("Navigation: position {} marked suspect", self.position);
        }
        self.position.confidence = Confidence::Suspect;
    }

    /// Re-home after a suspected desync
    pub async fn rehome(&mut self, link: &mut DeviceLink) -> Result<(), NavigationError> {
        self.reset_to_origin(link).await
    }

    /// Drive the device cursor to the root of the hierarchy
    ///
    /// Emits enough collapse and retreat commands to reach the origin from any
    /// position within the configured bounds; surplus moves are ignored by the
    /// device once it is there. Always emits the same number of commands.
    pub async fn reset_to_origin(&mut self, link: &mut DeviceLink) -> Result<(), NavigationError> {
        log::debug!("Navigation: reset to origin from {}", self.position);
        // Any partial reset leaves the cursor somewhere unknown
        self.position.confidence = Confidence::Suspect;

        let collapses = self.bounds.max_depth + 1;
        let retreats = self.bounds.max_breadth + 1;
        let mut outcome = link.repeat(DeviceCommand::Collapse, collapses).await;
        if outcome.is_ok() {
            outcome = link.repeat(DeviceCommand::FolderRetreat, retreats).await;
        }

        match outcome {
            Ok(()) => {
                self.position = BrowsePosition::origin();
                Ok(())
            }
            Err(e) => {
                log::warn!("Navigation: reset failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// Re-home, then open each folder of `path` in turn
    pub async fn navigate_to_folder(
        &mut self,
        link: &mut DeviceLink,
        path: &[usize],
    ) -> Result<(), NavigationError> {
        self.check_bounds(path)?;
        self.reset_to_origin(link).await?;

        for &sibling in path {
            for _ in 0..sibling {
                self.step(link, DeviceCommand::FolderAdvance).await?;
            }
            self.step(link, DeviceCommand::Expand).await?;
        }
        log::debug!("Navigation: at folder {}", self.position);
        Ok(())
    }

    /// Highlight row `index` of the open folder
    ///
    /// Assumes the believed in-folder row, which is 0 right after entering a
    /// folder.
    pub async fn select_track_in_folder(
        &mut self,
        link: &mut DeviceLink,
        index: usize,
    ) -> Result<(), NavigationError> {
        if self.position.folder_path.is_empty() {
            return Err(NavigationError::UnknownTarget(format!(
                "track row {} requested at the hierarchy root",
                index
            )));
        }

        while self.position.index < index {
            self.step(link, DeviceCommand::TrackAdvance).await?;
        }
        while self.position.index > index {
            self.step(link, DeviceCommand::TrackRetreat).await?;
        }
        Ok(())
    }

    /// Navigate to a folder and highlight a row in it
    pub async fn navigate_and_select(
        &mut self,
        link: &mut DeviceLink,
        path: &[usize],
        index: usize,
    ) -> Result<BrowsePosition, NavigationError> {
        self.navigate_to_folder(link, path).await?;
        self.select_track_in_folder(link, index).await?;
        Ok(self.position.clone())
    }

    /// Navigate to a catalog location given by folder names
    pub async fn navigate_to_location(
        &mut self,
        link: &mut DeviceLink,
        catalog: &dyn Catalog,
        location: &BrowseLocation,
    ) -> Result<BrowsePosition, NavigationError> {
        let path = catalog
            .resolve_folders(&location.folders)
            .ok_or_else(|| NavigationError::UnknownTarget(location.to_string()))?;
        self.navigate_and_select(link, &path, location.index).await
    }

    fn check_bounds(&self, path: &[usize]) -> Result<(), NavigationError> {
        if path.len() > self.bounds.max_depth
            || path.iter().any(|&i| i >= self.bounds.max_breadth)
        {
            return Err(NavigationError::OutOfBounds(format!("{:?}", path)));
        }
        Ok(())
    }

    /// Send one relative move and update the belief as if it succeeded
    async fn step(&mut self, link: &mut DeviceLink, command: DeviceCommand) -> Result<(), NavigationError> {
        if let Err(e) = link.send(command).await {
            self.mark_suspect();
            return Err(e.into());
        }

        let position = &mut self.position;
        match command {
            DeviceCommand::FolderAdvance | DeviceCommand::TrackAdvance => position.index += 1,
            DeviceCommand::FolderRetreat | DeviceCommand::TrackRetreat => {
                position.index = position.index.saturating_sub(1)
            }
            DeviceCommand::Expand => {
                position.folder_path.push(position.index);
                position.index = 0;
            }
            DeviceCommand::Collapse => {
                if let Some(parent) = position.folder_path.pop() {
                    position.index = parent;
                }
            }
            _ => {}
        }
        if position.confidence == Confidence::Certain {
            position.confidence = Confidence::Estimated;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::tree;
    use crate::device::{RecordingChannel, SimulatedDevice};
    use crate::types::DeckId;
    use std::time::Duration;
    use tokio::time::Instant;

    fn bounds() -> NavigationConfig {
        NavigationConfig {
            max_depth: 3,
            max_breadth: 8,
        }
    }

    fn link(channel: Arc<dyn CommandChannel>) -> DeviceLink {
        DeviceLink::new(channel, SettleDelays::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_is_idempotent() {
        let recorder = RecordingChannel::new();
        let mut link = link(Arc::new(recorder.clone()));
        let mut nav = NavigationController::new(bounds());
        assert_eq!(nav.position().confidence, Confidence::Suspect);

        nav.reset_to_origin(&mut link).await.unwrap();
        let first = recorder.len();
        assert_eq!(nav.position(), &BrowsePosition::origin());

        nav.reset_to_origin(&mut link).await.unwrap();
        assert_eq!(recorder.len() - first, first);
        assert_eq!(first, nav.reset_command_count());
        assert_eq!(nav.position(), &BrowsePosition::origin());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_count_independent_of_prior_position() {
        let recorder = RecordingChannel::new();
        let mut link = link(Arc::new(recorder.clone()));
        let mut nav = NavigationController::new(bounds());

        nav.navigate_and_select(&mut link, &[2, 1], 5).await.unwrap();
        recorder.clear();
        nav.reset_to_origin(&mut link).await.unwrap();
        assert_eq!(recorder.len(), nav.reset_command_count());
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigate_and_select_is_deterministic() {
        let recorder = RecordingChannel::new();
        let mut link = link(Arc::new(recorder.clone()));
        let mut nav = NavigationController::new(bounds());

        let first = nav.navigate_and_select(&mut link, &[1, 2], 3).await.unwrap();
        let first_commands = recorder.commands();
        recorder.clear();
        let second = nav.navigate_and_select(&mut link, &[1, 2], 3).await.unwrap();

        assert_eq!(first_commands, recorder.commands());
        assert_eq!(first, second);
        assert_eq!(second.folder_path, vec![1, 2]);
        assert_eq!(second.index, 3);
        assert_eq!(second.confidence, Confidence::Estimated);

        let tail: Vec<_> = first_commands[nav.reset_command_count()..].to_vec();
        assert_eq!(
            tail,
            vec![
                DeviceCommand::FolderAdvance,
                DeviceCommand::Expand,
                DeviceCommand::FolderAdvance,
                DeviceCommand::FolderAdvance,
                DeviceCommand::Expand,
                DeviceCommand::TrackAdvance,
                DeviceCommand::TrackAdvance,
                DeviceCommand::TrackAdvance,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_belief_matches_device_from_arbitrary_start() {
        // Someone left the cursor deep in House/Tech
        let device = Arc::new(SimulatedDevice::new(tree(), 10).with_cursor(vec![0, 1], 7));
        let mut link = link(device.clone());
        let mut nav = NavigationController::new(bounds());

        let believed = nav.navigate_and_select(&mut link, &[0, 0], 4).await.unwrap();
        let state = device.state();
        assert_eq!(state.folder_path, believed.folder_path);
        assert_eq!(state.index, believed.index);

        link.send(DeviceCommand::LoadDeck { deck: DeckId::A }).await.unwrap();
        assert_eq!(device.state().loaded[0], Some((vec![0, 0], 4)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_delays_pace_commands() {
        let settle = SettleDelays::default();
        let mut link = DeviceLink::new(Arc::new(RecordingChannel::new()), settle);
        let mut nav = NavigationController::new(bounds());

        let started = Instant::now();
        nav.navigate_to_folder(&mut link, &[1]).await.unwrap();
        let folder_moves = nav.reset_command_count() as u32 + 2;
        assert_eq!(started.elapsed(), Duration::from_millis(settle.folder_ms) * folder_moves);

        let started = Instant::now();
        nav.select_track_in_folder(&mut link, 3).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(settle.track_ms) * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_failure_marks_position_suspect() {
        let recorder = RecordingChannel::new();
        let mut link = link(Arc::new(recorder.clone()));
        let mut nav = NavigationController::new(bounds());
        recorder.fail_after(nav.reset_command_count() + 1);

        let result = nav.navigate_and_select(&mut link, &[2], 0).await;
        assert!(matches!(result, Err(NavigationError::Device(_))));
        assert_eq!(nav.position().confidence, Confidence::Suspect);

        recorder.recover();
        nav.rehome(&mut link).await.unwrap();
        assert_eq!(nav.position().confidence, Confidence::Certain);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_bounds_sends_nothing() {
        let recorder = RecordingChannel::new();
        let mut link = link(Arc::new(recorder.clone()));
        let mut nav = NavigationController::new(bounds());

        let deep = nav.navigate_to_folder(&mut link, &[0, 0, 0, 0]).await;
        assert!(matches!(deep, Err(NavigationError::OutOfBounds(_))));
        let wide = nav.navigate_to_folder(&mut link, &[8]).await;
        assert!(matches!(wide, Err(NavigationError::OutOfBounds(_))));
        assert!(recorder.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_location() {
        let catalog = crate::catalog::InMemoryCatalog::new(tree(), vec![]).unwrap();
        let mut link = link(Arc::new(RecordingChannel::new()));
        let mut nav = NavigationController::new(bounds());
        let location = BrowseLocation {
            folders: vec!["Jazz".into()],
            index: 0,
        };

        let result = nav.navigate_to_location(&mut link, &catalog, &location).await;
        assert!(matches!(result, Err(NavigationError::UnknownTarget(_))));
    }

    #[test]
    fn test_mark_suspect() {
        let mut nav = NavigationController::new(bounds());
        nav.position = BrowsePosition::origin();
        nav.mark_suspect();
        assert_eq!(nav.position().confidence, Confidence::Suspect);
    }
}
