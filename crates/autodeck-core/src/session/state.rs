//! Session and deck state
//!
//! Deck positions are never read from the device. Elapsed time is estimated
//! from the moment play was toggled, and remaining bars from that estimate and
//! the track's tempo.

use super::events::EventLog;
use crate::catalog::CatalogScope;
use crate::navigation::BrowsePosition;
use crate::types::{DeckId, Track, TrackId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Initializing,
    Playing,
    LoadingNext,
    Mixing,
    Ending,
    Ended,
    Aborted,
}

impl SessionPhase {
    /// Ended or aborted
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::Ended | SessionPhase::Aborted)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Initializing => "initializing",
            SessionPhase::Playing => "playing",
            SessionPhase::LoadingNext => "loading-next",
            SessionPhase::Mixing => "mixing",
            SessionPhase::Ending => "ending",
            SessionPhase::Ended => "ended",
            SessionPhase::Aborted => "aborted",
        };
        write!(f, "{}", name)
    }
}

/// Believed state of one deck
#[derive(Debug, Clone)]
pub struct DeckState {
    pub track: Option<Track>,
    pub playing: bool,
    /// Channel volume last sent
    pub volume: f32,
    /// Safety setup applied since the last load
    pub armed: bool,
    /// Playback time accumulated before `started_at`
    elapsed_base: Duration,
    started_at: Option<Instant>,
}

impl Default for DeckState {
    fn default() -> Self {
        Self {
            track: None,
            playing: false,
            volume: 0.0,
            armed: false,
            elapsed_base: Duration::ZERO,
            started_at: None,
        }
    }
}

impl DeckState {
    /// A new track was loaded; position and safety state start over
    pub fn load(&mut self, track: Track) {
        self.track = Some(track);
        self.playing = false;
        self.armed = false;
        self.elapsed_base = Duration::ZERO;
        self.started_at = None;
    }

    pub fn start(&mut self, now: Instant) {
        self.playing = true;
        self.started_at = Some(now);
    }

    pub fn stop(&mut self, now: Instant) {
        self.elapsed_base = self.elapsed(now);
        self.started_at = None;
        self.playing = false;
    }

    /// Replace the estimate with an externally observed one
    pub fn correct(&mut self, elapsed: Duration, playing: bool, now: Instant) {
        self.elapsed_base = elapsed;
        self.playing = playing;
        self.started_at = playing.then_some(now);
    }

    /// Estimated playback time of the loaded track
    pub fn elapsed(&self, now: Instant) -> Duration {
        match self.started_at {
            Some(started) => self.elapsed_base + now.saturating_duration_since(started),
            None => self.elapsed_base,
        }
    }

    /// Estimated time left, `None` without a track
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let track = self.track.as_ref()?;
        Some(track.duration().saturating_sub(self.elapsed(now)))
    }

    /// Estimated musical bars left, `None` without a track
    pub fn remaining_bars(&self, now: Instant, beats_per_bar: u32) -> Option<f64> {
        let track = self.track.as_ref()?;
        let remaining = self.remaining(now)?.as_secs_f64();
        Some(remaining * track.bpm / 60.0 / beats_per_bar.max(1) as f64)
    }
}

/// Serializable view of a deck
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckStatus {
    pub deck: DeckId,
    pub track: Option<TrackId>,
    pub title: Option<String>,
    pub playing: bool,
    pub volume: f32,
    pub armed: bool,
    pub remaining_bars: Option<f64>,
}

/// Snapshot returned by the control surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub genre: Option<String>,
    pub tracks_played: u32,
    pub active_deck: DeckId,
    pub decks: Vec<DeckStatus>,
    pub elapsed_secs: f64,
    pub target_secs: f64,
    pub position: Option<BrowsePosition>,
}

impl SessionStatus {
    /// Status when no session has been started
    pub fn idle() -> Self {
        Self {
            phase: SessionPhase::Idle,
            genre: None,
            tracks_played: 0,
            active_deck: DeckId::A,
            decks: Vec::new(),
            elapsed_secs: 0.0,
            target_secs: 0.0,
            position: None,
        }
    }
}

/// Top-level mutable session aggregate, owned by the session task
#[derive(Debug)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub genre: String,
    pub scope: CatalogScope,
    pub target: Duration,
    pub started_at: Instant,
    pub tracks_played: u32,
    pub energy: f32,
    /// Every track that has started playing, in order
    pub history: Vec<TrackId>,
    pub decks: [DeckState; 2],
    /// Deck currently audible
    pub active: DeckId,
    pub events: EventLog,
}

impl SessionState {
    pub fn new(genre: &str, scope: CatalogScope, target: Duration, energy: f32, events: EventLog) -> Self {
        Self {
            phase: SessionPhase::Idle,
            genre: genre.to_string(),
            scope,
            target,
            started_at: Instant::now(),
            tracks_played: 0,
            energy,
            history: Vec::new(),
            decks: [DeckState::default(), DeckState::default()],
            active: DeckId::A,
            events,
        }
    }

    pub fn deck(&self, deck: DeckId) -> &DeckState {
        &self.decks[deck.index()]
    }

    pub fn deck_mut(&mut self, deck: DeckId) -> &mut DeckState {
        &mut self.decks[deck.index()]
    }

    pub fn active_deck(&self) -> &DeckState {
        self.deck(self.active)
    }

    /// Session wall-clock time used up
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    /// Track ids that must not be picked again
    pub fn excluded(&self) -> Vec<TrackId> {
        let mut excluded = self.history.clone();
        for deck in &self.decks {
            if let Some(track) = &deck.track {
                excluded.push(track.id);
            }
        }
        excluded
    }

    pub fn status(&self, now: Instant, beats_per_bar: u32, position: Option<BrowsePosition>) -> SessionStatus {
        SessionStatus {
            phase: self.phase,
            genre: Some(self.genre.clone()),
            tracks_played: self.tracks_played,
            active_deck: self.active,
            decks: DeckId::ALL
                .iter()
                .map(|&id| {
                    let deck = self.deck(id);
                    DeckStatus {
                        deck: id,
                        track: deck.track.as_ref().map(|t| t.id),
                        title: deck.track.as_ref().map(|t| t.label()),
                        playing: deck.playing,
                        volume: deck.volume,
                        armed: deck.armed,
                        remaining_bars: deck.remaining_bars(now, beats_per_bar),
                    }
                })
                .collect(),
            elapsed_secs: self.elapsed(now).as_secs_f64(),
            target_secs: self.target.as_secs_f64(),
            position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::track;
    use crate::music::HarmonicKey;

    #[tokio::test(start_paused = true)]
    async fn test_remaining_bars_tracks_wall_clock() {
        // 120 BPM, 300 s = 600 beats = 150 bars
        let mut deck = DeckState::default();
        deck.load(track(1, HarmonicKey::minor(8), 120.0, &["Techno"], 0));
        let now = Instant::now();
        assert_eq!(deck.remaining_bars(now, 4), Some(150.0));

        deck.start(now);
        tokio::time::advance(Duration::from_secs(60)).await;
        let later = Instant::now();
        assert_eq!(deck.remaining_bars(later, 4), Some(120.0));

        deck.stop(later);
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(deck.elapsed(Instant::now()), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_correction_replaces_estimate() {
        let mut deck = DeckState::default();
        deck.load(track(1, HarmonicKey::minor(8), 120.0, &["Techno"], 0));
        let now = Instant::now();
        deck.start(now);
        deck.correct(Duration::from_secs(240), true, now);
        assert_eq!(deck.remaining(now), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_empty_deck_has_no_estimate() {
        let deck = DeckState::default();
        assert_eq!(deck.remaining_bars(Instant::now(), 4), None);
    }
}
