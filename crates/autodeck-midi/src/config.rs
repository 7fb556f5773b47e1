//! MIDI mapping profile
//!
//! Maps every device command to the MIDI control the DJ application has been
//! taught (MIDI-learn) to respond to. Stored as YAML, default location
//! `~/.config/autodeck/midi.yaml`:
//!
//! ```yaml
//! port_match: "autodeck"
//! browse:
//!   folder_advance: { type: note, channel: 0, note: 0x40 }
//!   collapse: { type: note, channel: 0, note: 0x45 }
//! decks:
//!   a:
//!     volume: { type: control_change, channel: 0, cc: 0x07 }
//! crossfader: { type: control_change, channel: 0, cc: 0x08 }
//! ```

use autodeck_core::config::{default_config_path, load_config};
use autodeck_core::types::{DeckId, EqBand};
use autodeck_core::DeviceCommand;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A single MIDI control address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MidiControlConfig {
    /// Note On/Off message
    Note {
        /// MIDI channel (0-15)
        channel: u8,
        /// Note number (0-127)
        note: u8,
    },
    /// Control Change message
    ControlChange {
        /// MIDI channel (0-15)
        channel: u8,
        /// CC number (0-127)
        cc: u8,
    },
}

impl MidiControlConfig {
    /// Create a Note control
    pub fn note(channel: u8, note: u8) -> Self {
        Self::Note { channel, note }
    }

    /// Create a CC control
    pub fn cc(channel: u8, cc: u8) -> Self {
        Self::ControlChange { channel, cc }
    }

    /// Get the MIDI channel
    pub fn channel(&self) -> u8 {
        match self {
            Self::Note { channel, .. } | Self::ControlChange { channel, .. } => *channel,
        }
    }

    /// Check channel and data byte ranges
    fn is_valid(&self) -> bool {
        let data = match self {
            Self::Note { note, .. } => *note,
            Self::ControlChange { cc, .. } => *cc,
        };
        self.channel() < 16 && data < 128
    }
}

/// Browse tree controls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowseControls {
    pub folder_advance: MidiControlConfig,
    pub folder_retreat: MidiControlConfig,
    pub track_advance: MidiControlConfig,
    pub track_retreat: MidiControlConfig,
    pub expand: MidiControlConfig,
    pub collapse: MidiControlConfig,
}

impl Default for BrowseControls {
    fn default() -> Self {
        Self {
            folder_advance: MidiControlConfig::note(0, 0x40),
            folder_retreat: MidiControlConfig::note(0, 0x41),
            track_advance: MidiControlConfig::note(0, 0x42),
            track_retreat: MidiControlConfig::note(0, 0x43),
            expand: MidiControlConfig::note(0, 0x44),
            collapse: MidiControlConfig::note(0, 0x45),
        }
    }
}

/// Per-deck controls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckControls {
    pub load: MidiControlConfig,
    pub play: MidiControlConfig,
    pub volume: MidiControlConfig,
    pub eq_low: MidiControlConfig,
    pub eq_mid: MidiControlConfig,
    pub eq_high: MidiControlConfig,
}

impl DeckControls {
    /// Default layout: one MIDI channel per deck
    fn on_channel(channel: u8) -> Self {
        Self {
            load: MidiControlConfig::note(channel, 0x10),
            play: MidiControlConfig::note(channel, 0x11),
            volume: MidiControlConfig::cc(channel, 0x07),
            eq_low: MidiControlConfig::cc(channel, 0x10),
            eq_mid: MidiControlConfig::cc(channel, 0x11),
            eq_high: MidiControlConfig::cc(channel, 0x12),
        }
    }

    fn eq(&self, band: EqBand) -> MidiControlConfig {
        match band {
            EqBand::Low => self.eq_low,
            EqBand::Mid => self.eq_mid,
            EqBand::High => self.eq_high,
        }
    }
}

/// Controls for both decks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckPair {
    pub a: DeckControls,
    pub b: DeckControls,
}

impl Default for DeckPair {
    fn default() -> Self {
        Self {
            a: DeckControls::on_channel(1),
            b: DeckControls::on_channel(2),
        }
    }
}

/// Complete mapping profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiCommandMap {
    /// Output port name pattern (case-insensitive substring match)
    pub port_match: String,
    pub browse: BrowseControls,
    pub decks: DeckPair,
    pub crossfader: MidiControlConfig,
}

impl Default for MidiCommandMap {
    fn default() -> Self {
        Self {
            port_match: "autodeck".to_string(),
            browse: BrowseControls::default(),
            decks: DeckPair::default(),
            crossfader: MidiControlConfig::cc(0, 0x08),
        }
    }
}

impl MidiCommandMap {
    pub fn deck(&self, deck: DeckId) -> &DeckControls {
        match deck {
            DeckId::A => &self.decks.a,
            DeckId::B => &self.decks.b,
        }
    }

    /// The control a command is sent on
    pub fn control_for(&self, command: &DeviceCommand) -> MidiControlConfig {
        match *command {
            DeviceCommand::FolderAdvance => self.browse.folder_advance,
            DeviceCommand::FolderRetreat => self.browse.folder_retreat,
            DeviceCommand::TrackAdvance => self.browse.track_advance,
            DeviceCommand::TrackRetreat => self.browse.track_retreat,
            DeviceCommand::Expand => self.browse.expand,
            DeviceCommand::Collapse => self.browse.collapse,
            DeviceCommand::LoadDeck { deck } => self.deck(deck).load,
            DeviceCommand::PlayToggle { deck } => self.deck(deck).play,
            DeviceCommand::SetVolume { deck, .. } => self.deck(deck).volume,
            DeviceCommand::SetCrossfader { .. } => self.crossfader,
            DeviceCommand::SetEq { deck, band, .. } => self.deck(deck).eq(band),
        }
    }

    /// Every control in the profile, for validation
    fn controls(&self) -> Vec<MidiControlConfig> {
        let b = &self.browse;
        let mut all = vec![
            b.folder_advance,
            b.folder_retreat,
            b.track_advance,
            b.track_retreat,
            b.expand,
            b.collapse,
            self.crossfader,
        ];
        for deck in [&self.decks.a, &self.decks.b] {
            all.extend([deck.load, deck.play, deck.volume, deck.eq_low, deck.eq_mid, deck.eq_high]);
        }
        all
    }

    /// Check that every control is a valid MIDI address and none is mapped twice
    pub fn validate(&self) -> Result<(), String> {
        let controls = self.controls();
        if let Some(bad) = controls.iter().find(|c| !c.is_valid()) {
            return Err(format!("Invalid MIDI control {:?}", bad));
        }
        for (i, control) in controls.iter().enumerate() {
            if controls[i + 1..].contains(control) {
                return Err(format!("MIDI control {:?} is mapped to more than one command", control));
            }
        }
        Ok(())
    }
}

/// Default mapping profile path (`~/.config/autodeck/midi.yaml`)
pub fn default_midi_map_path() -> PathBuf {
    default_config_path("midi.yaml")
}

/// Load a mapping profile, falling back to the built-in layout
pub fn load_midi_map(path: &Path) -> MidiCommandMap {
    let map: MidiCommandMap = load_config(path);
    if let Err(e) = map.validate() {
        log::warn!("load_midi_map: {}, using default mapping", e);
        return MidiCommandMap::default();
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_map_is_valid() {
        MidiCommandMap::default().validate().unwrap();
    }

    #[test]
    fn test_duplicate_control_rejected() {
        let mut map = MidiCommandMap::default();
        map.browse.expand = map.browse.collapse;
        assert!(map.validate().is_err());
    }

    #[test]
    fn test_control_for_per_deck() {
        let map = MidiCommandMap::default();
        assert_eq!(
            map.control_for(&DeviceCommand::PlayToggle { deck: DeckId::B }),
            MidiControlConfig::note(2, 0x11)
        );
        assert_eq!(
            map.control_for(&DeviceCommand::SetEq {
                deck: DeckId::A,
                band: EqBand::High,
                level: 0.5
            }),
            MidiControlConfig::cc(1, 0x12)
        );
    }

    #[test]
    fn test_partial_yaml_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("midi.yaml");
        std::fs::write(
            &path,
            r#"
port_match: "loopMIDI"
crossfader: { type: control_change, channel: 3, cc: 1 }
"#,
        )
        .unwrap();

        let map = load_midi_map(&path);
        assert_eq!(map.port_match, "loopMIDI");
        assert_eq!(map.crossfader, MidiControlConfig::cc(3, 1));
        assert_eq!(map.browse, BrowseControls::default());
    }

    #[test]
    fn test_invalid_profile_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("midi.yaml");
        std::fs::write(&path, "crossfader: { type: control_change, channel: 16, cc: 1 }\n").unwrap();
        assert_eq!(load_midi_map(&path), MidiCommandMap::default());
    }
}
