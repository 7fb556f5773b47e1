//! Core data types shared across autodeck
//!
//! Tracks are immutable catalog entries; the session and navigation layers only
//! ever read them.

use crate::music::HarmonicKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Catalog identifier of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a track lives in the controlled application's browse hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseLocation {
    /// Folder names from the hierarchy root down to the containing folder
    pub folders: Vec<String>,
    /// Row of the track inside the containing folder (0 = top)
    pub index: usize,
}

impl BrowseLocation {
    /// Check whether this location sits under the given folder prefix
    pub fn is_under(&self, root: &[String]) -> bool {
        self.folders.len() >= root.len()
            && self.folders.iter().zip(root).all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

impl fmt::Display for BrowseLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.folders.join("/"), self.index)
    }
}

/// Immutable catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    pub artist: String,
    /// Tempo in beats per minute (always positive)
    pub bpm: f64,
    pub key: HarmonicKey,
    /// Duration in seconds
    pub duration_secs: f64,
    /// Path of the audio file on disk
    #[serde(default)]
    pub path: PathBuf,
    pub location: BrowseLocation,
}

impl Track {
    /// Track duration as a `Duration` (zero if the stored length is unusable)
    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.duration_secs).unwrap_or_default()
    }

    /// Total length of the track in bars at its native tempo
    pub fn total_bars(&self, beats_per_bar: u32) -> f64 {
        let beats = self.duration_secs * self.bpm / 60.0;
        beats / beats_per_bar.max(1) as f64
    }

    /// Short human-readable label for logs
    pub fn label(&self) -> String {
        format!("{} - {} ({}, {:.1} BPM)", self.artist, self.title, self.key, self.bpm)
    }
}

/// Playback slot in the controlled application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeckId {
    A,
    B,
}

impl DeckId {
    /// Both decks in order
    pub const ALL: [DeckId; 2] = [DeckId::A, DeckId::B];

    /// The deck on the opposite side of the crossfader
    pub fn other(self) -> Self {
        match self {
            DeckId::A => DeckId::B,
            DeckId::B => DeckId::A,
        }
    }

    /// Zero-based index (A = 0, B = 1)
    pub fn index(self) -> usize {
        match self {
            DeckId::A => 0,
            DeckId::B => 1,
        }
    }

    /// Crossfader position at which only this deck is audible
    pub fn crossfader_side(self) -> f32 {
        match self {
            DeckId::A => 0.0,
            DeckId::B => 1.0,
        }
    }
}

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeckId::A => write!(f, "A"),
            DeckId::B => write!(f, "B"),
        }
    }
}

/// EQ band on a deck channel strip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EqBand {
    Low,
    Mid,
    High,
}

impl EqBand {
    pub const ALL: [EqBand; 3] = [EqBand::Low, EqBand::Mid, EqBand::High];
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(folders: &[&str], index: usize) -> BrowseLocation {
        BrowseLocation {
            folders: folders.iter().map(|s| s.to_string()).collect(),
            index,
        }
    }

    #[test]
    fn test_location_prefix_is_case_insensitive() {
        let loc = location(&["House", "Deep"], 3);
        assert!(loc.is_under(&["house".to_string()]));
        assert!(loc.is_under(&[]));
        assert!(!loc.is_under(&["Techno".to_string()]));
        assert!(!loc.is_under(&["House".into(), "Deep".into(), "Vinyl".into()]));
    }

    #[test]
    fn test_total_bars() {
        let track = Track {
            id: TrackId(1),
            title: "t".into(),
            artist: "a".into(),
            bpm: 120.0,
            key: HarmonicKey::minor(8),
            duration_secs: 240.0,
            path: PathBuf::new(),
            location: location(&["House"], 0),
        };
        // 240s at 120 BPM = 480 beats = 120 bars of 4/4
        assert!((track.total_bars(4) - 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_deck_sides() {
        assert_eq!(DeckId::A.other(), DeckId::B);
        assert_eq!(DeckId::A.crossfader_side(), 0.0);
        assert_eq!(DeckId::B.crossfader_side(), 1.0);
    }
}
