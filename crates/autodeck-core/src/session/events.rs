//! Append-only session event log

use crate::navigation::BrowsePosition;
use crate::types::{DeckId, TrackId};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Where a next-track choice came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// Decision service pick from the matcher shortlist
    Service,
    /// Matcher's best candidate
    MatcherTop,
    /// Genre default tempo/key when the active track had no match
    GenreDefault,
    /// First track of the genre scope (session start only)
    ScopeFirst,
}

/// What happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    SessionStarted { genre: String, target_minutes: f64 },
    NavigationAttempt { track: TrackId, target: String },
    NavigationFailed { track: TrackId, target: String, reason: String },
    LoadAttempt { deck: DeckId, track: TrackId },
    LoadFailed { deck: DeckId, track: TrackId, reason: String },
    DecisionMade {
        track: TrackId,
        source: DecisionSource,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        score: Option<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rationale: Option<String>,
    },
    DecisionFailed { reason: String },
    NoCompatibleTrack { reference: Option<TrackId> },
    PlaybackStarted { deck: DeckId, track: TrackId },
    MixStarted { from: DeckId, to: DeckId },
    MixCompleted { active: DeckId, failed_steps: u32 },
    TrackEnded { deck: DeckId, track: TrackId },
    PositionCorrected { reported: BrowsePosition },
    DeckCorrected { deck: DeckId, elapsed_secs: f64, playing: bool },
    StopRequested,
    SessionEnded { tracks_played: u32 },
    SessionAborted { reason: String },
}

/// Timestamped event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub at: DateTime<Local>,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Shared, append-only event log
///
/// Only the session task appends; clones held by the control surface read
/// snapshots.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event stamped with the current wall-clock time
    pub fn record(&self, kind: EventKind) {
        let event = SessionEvent {
            at: Local::now(),
            kind,
        };
        self.lock().push(event);
    }

    /// Copy of all events so far
    pub fn snapshot(&self) -> Vec<SessionEvent> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of events matching a predicate
    pub fn count(&self, predicate: impl Fn(&EventKind) -> bool) -> usize {
        self.lock().iter().filter(|e| predicate(&e.kind)).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SessionEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_count() {
        let log = EventLog::new();
        let reader = log.clone();
        log.record(EventKind::StopRequested);
        log.record(EventKind::DecisionFailed {
            reason: "timeout".into(),
        });
        log.record(EventKind::StopRequested);

        assert_eq!(reader.len(), 3);
        assert_eq!(reader.count(|k| matches!(k, EventKind::StopRequested)), 2);
    }

    #[test]
    fn test_event_json_shape() {
        let event = SessionEvent {
            at: Local::now(),
            kind: EventKind::LoadAttempt {
                deck: DeckId::B,
                track: TrackId(12),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "load_attempt");
        assert_eq!(json["deck"], "B");
        assert_eq!(json["track"], 12);

        let back: SessionEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind, event.kind);
    }
}
