//! Compatibility matcher
//!
//! Ranks catalog tracks against a reference key/tempo using the harmonic wheel
//! and a tempo tolerance window. Everything here is pure: the only input
//! besides the reference is a read-only catalog query, and the output order is
//! fully deterministic.
//!
//! # Scoring
//!
//! ```text
//! key contribution   identical / relative = 10, ±1 same mode = 8,
//!                    ±2 same mode = 5, anything else = 0
//! tempo contribution |Δbpm| ≤ 1 = 5, ≤ 3 = 3, ≤ 6 = 1, else 0
//! total              key + tempo (0-15)
//! ```
//!
//! Candidates outside `reference × (1 ± tolerance)` are always dropped.
//! Candidates with no key contribution are dropped unless the caller asks for
//! [`MatchMode::TempoOnly`].

use crate::catalog::{Catalog, CatalogQuery, CatalogScope};
use crate::music::HarmonicKey;
use crate::types::Track;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Default tempo window, in percent of the reference tempo
pub const DEFAULT_TEMPO_TOLERANCE_PCT: f64 = 6.0;

/// Classification of the harmonic relationship between two keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRelation {
    /// Same position, same mode
    Identical,
    /// Same position, other mode (relative major/minor)
    Relative,
    /// One step around the wheel, same mode
    Adjacent,
    /// Two steps around the wheel, same mode
    TwoSteps,
    /// Anything else
    Unrelated,
}

impl KeyRelation {
    /// Classify `candidate` relative to `reference`
    pub fn classify(reference: &HarmonicKey, candidate: &HarmonicKey) -> Self {
        let same_mode = reference.mode() == candidate.mode();
        match (reference.distance(candidate), same_mode) {
            (0, true) => KeyRelation::Identical,
            (0, false) => KeyRelation::Relative,
            (1, true) => KeyRelation::Adjacent,
            (2, true) => KeyRelation::TwoSteps,
            _ => KeyRelation::Unrelated,
        }
    }

    /// Score contribution of this relationship
    pub fn contribution(self) -> u8 {
        match self {
            KeyRelation::Identical | KeyRelation::Relative => 10,
            KeyRelation::Adjacent => 8,
            KeyRelation::TwoSteps => 5,
            KeyRelation::Unrelated => 0,
        }
    }
}

/// Score contribution for a tempo difference in BPM
pub fn tempo_contribution(bpm_diff: f64) -> u8 {
    let diff = bpm_diff.abs();
    if diff <= 1.0 {
        5
    } else if diff <= 3.0 {
        3
    } else if diff <= 6.0 {
        1
    } else {
        0
    }
}

/// Compatibility of a candidate against a reference (0-15)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityScore {
    pub key: u8,
    pub tempo: u8,
}

impl CompatibilityScore {
    /// Combined score
    pub fn total(&self) -> u8 {
        self.key + self.tempo
    }
}

impl fmt::Display for CompatibilityScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} key + {} tempo)", self.total(), self.key, self.tempo)
    }
}

/// Whether key-incompatible candidates are kept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Only candidates with a nonzero key contribution
    #[default]
    Harmonic,
    /// Any key, ranked by whatever key and tempo contributions they earn
    TempoOnly,
}

/// Matcher parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOptions {
    pub tempo_tolerance_pct: f64,
    pub mode: MatchMode,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            tempo_tolerance_pct: DEFAULT_TEMPO_TOLERANCE_PCT,
            mode: MatchMode::Harmonic,
        }
    }
}

impl MatchOptions {
    /// Inclusive tempo window around `reference_bpm`
    pub fn tempo_window(&self, reference_bpm: f64) -> (f64, f64) {
        let ratio = self.tempo_tolerance_pct.max(0.0) / 100.0;
        (reference_bpm * (1.0 - ratio), reference_bpm * (1.0 + ratio))
    }
}

/// A ranked candidate
#[derive(Debug, Clone)]
pub struct Candidate {
    pub track: Track,
    pub score: CompatibilityScore,
    /// Absolute tempo difference to the reference, in BPM
    pub bpm_diff: f64,
}

/// Score a single candidate, or `None` if it must be excluded
pub fn score_candidate(
    reference_key: &HarmonicKey,
    reference_bpm: f64,
    candidate: &Track,
    options: &MatchOptions,
) -> Option<CompatibilityScore> {
    let (min_bpm, max_bpm) = options.tempo_window(reference_bpm);
    if candidate.bpm < min_bpm || candidate.bpm > max_bpm {
        return None;
    }

    let key = KeyRelation::classify(reference_key, &candidate.key).contribution();
    if key == 0 && options.mode == MatchMode::Harmonic {
        return None;
    }

    Some(CompatibilityScore {
        key,
        tempo: tempo_contribution(candidate.bpm - reference_bpm),
    })
}

/// Rank an ordered sequence of tracks against a reference
///
/// Sorted by total score descending, then tempo difference ascending, then
/// input order (the sort is stable).
pub fn rank_candidates<I>(
    reference_key: &HarmonicKey,
    reference_bpm: f64,
    tracks: I,
    options: &MatchOptions,
) -> Vec<Candidate>
where
    I: IntoIterator<Item = Track>,
{
    let mut ranked: Vec<Candidate> = tracks
        .into_iter()
        .filter_map(|track| {
            let score = score_candidate(reference_key, reference_bpm, &track, options)?;
            let bpm_diff = (track.bpm - reference_bpm).abs();
            Some(Candidate { track, score, bpm_diff })
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .total()
            .cmp(&a.score.total())
            .then_with(|| a.bpm_diff.partial_cmp(&b.bpm_diff).unwrap_or(Ordering::Equal))
    });

    ranked
}

/// Find catalog tracks compatible with a reference key and tempo
pub fn find_compatible(
    catalog: &dyn Catalog,
    reference_key: &HarmonicKey,
    reference_bpm: f64,
    scope: &CatalogScope,
    options: &MatchOptions,
) -> Vec<Candidate> {
    let (min_bpm, max_bpm) = options.tempo_window(reference_bpm);
    let keys = match options.mode {
        MatchMode::Harmonic => Some(reference_key.compatible_set()),
        MatchMode::TempoOnly => None,
    };

    let tracks = catalog.query(&CatalogQuery {
        scope: scope.clone(),
        min_bpm,
        max_bpm,
        keys,
    });

    let ranked = rank_candidates(reference_key, reference_bpm, tracks, options);
    log::debug!(
        "find_compatible: {} @ {:.1} BPM -> {} candidates",
        reference_key,
        reference_bpm,
        ranked.len()
    );
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::{track, tree};
    use crate::catalog::InMemoryCatalog;
    use crate::music::Mode;

    fn all_keys() -> Vec<HarmonicKey> {
        (1..=12)
            .flat_map(|p| [HarmonicKey::minor(p), HarmonicKey::major(p)])
            .collect()
    }

    #[test]
    fn test_reference_scenario() {
        let catalog = InMemoryCatalog::new(
            tree(),
            vec![
                track(1, HarmonicKey::major(8), 128.0, &["Techno"], 0),
                track(2, HarmonicKey::minor(9), 130.0, &["Techno"], 1),
                track(3, HarmonicKey::minor(6), 140.0, &["Techno"], 2),
            ],
        )
        .unwrap();

        let ranked = find_compatible(
            &catalog,
            &HarmonicKey::minor(8),
            128.0,
            &CatalogScope::all(),
            &MatchOptions::default(),
        );

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].track.id.0, 1);
        assert_eq!(ranked[0].score.total(), 15);
        assert_eq!(ranked[1].track.id.0, 2);
        assert_eq!(ranked[1].score, CompatibilityScore { key: 8, tempo: 3 });
    }

    #[test]
    fn test_key_contribution_bounds_for_all_pairs() {
        for reference in all_keys() {
            for candidate in all_keys() {
                let relation = KeyRelation::classify(&reference, &candidate);
                let contribution = relation.contribution();
                assert!(contribution <= 10);
                if reference.distance(&candidate) > 2 {
                    assert_eq!(contribution, 0, "{} -> {}", reference, candidate);
                }
                if reference.mode() != candidate.mode() && reference.distance(&candidate) != 0 {
                    assert_eq!(contribution, 0, "{} -> {}", reference, candidate);
                }
            }
        }
    }

    #[test]
    fn test_wheel_wraps_between_twelve_and_one() {
        let twelve = HarmonicKey::minor(12);
        assert_eq!(KeyRelation::classify(&twelve, &HarmonicKey::minor(1)), KeyRelation::Adjacent);
        assert_eq!(KeyRelation::classify(&twelve, &HarmonicKey::minor(2)), KeyRelation::TwoSteps);
        assert_eq!(
            KeyRelation::classify(&twelve, &HarmonicKey::new(12, Mode::Major).unwrap()),
            KeyRelation::Relative
        );
    }

    #[test]
    fn test_score_non_increasing_with_tempo_distance() {
        let reference = HarmonicKey::minor(8);
        let options = MatchOptions::default();
        let mut previous = u8::MAX;
        let mut bpm = 128.0;
        while bpm <= 128.0 * 1.06 {
            let candidate = track(1, reference, bpm, &["Techno"], 0);
            let score = score_candidate(&reference, 128.0, &candidate, &options)
                .expect("inside window")
                .total();
            assert!(score <= previous, "score rose at {} BPM", bpm);
            previous = score;
            bpm += 0.25;
        }
    }

    #[test]
    fn test_outside_window_excluded_even_in_tempo_only_mode() {
        let options = MatchOptions {
            mode: MatchMode::TempoOnly,
            ..MatchOptions::default()
        };
        let far = track(1, HarmonicKey::minor(8), 140.0, &["Techno"], 0);
        assert!(score_candidate(&HarmonicKey::minor(8), 128.0, &far, &options).is_none());
    }

    #[test]
    fn test_tempo_only_keeps_unrelated_keys() {
        let unrelated = track(1, HarmonicKey::major(2), 128.5, &["Techno"], 0);
        let reference = HarmonicKey::minor(8);

        assert!(score_candidate(&reference, 128.0, &unrelated, &MatchOptions::default()).is_none());

        let options = MatchOptions {
            mode: MatchMode::TempoOnly,
            ..MatchOptions::default()
        };
        let score = score_candidate(&reference, 128.0, &unrelated, &options).unwrap();
        assert_eq!(score, CompatibilityScore { key: 0, tempo: 5 });
    }

    #[test]
    fn test_ties_break_on_tempo_then_catalog_order() {
        let reference = HarmonicKey::minor(8);
        let tracks = vec![
            track(1, HarmonicKey::minor(9), 126.0, &["Techno"], 0), // 8 + 3, diff 2
            track(2, HarmonicKey::minor(7), 129.5, &["Techno"], 1), // 8 + 3, diff 1.5
            track(3, HarmonicKey::minor(9), 130.0, &["Techno"], 2), // 8 + 3, diff 2
        ];
        let ranked = rank_candidates(&reference, 128.0, tracks, &MatchOptions::default());
        let ids: Vec<_> = ranked.iter().map(|c| c.track.id.0).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn test_deterministic_output() {
        let catalog = InMemoryCatalog::new(
            tree(),
            (0..20)
                .map(|i| track(i, HarmonicKey::minor((i % 12) as u8 + 1), 120.0 + i as f64 * 0.5, &["Techno"], i as usize))
                .collect(),
        )
        .unwrap();
        let run = || {
            find_compatible(&catalog, &HarmonicKey::minor(5), 124.0, &CatalogScope::all(), &MatchOptions::default())
                .into_iter()
                .map(|c| c.track.id)
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_tempo_contribution_steps() {
        assert_eq!(tempo_contribution(0.0), 5);
        assert_eq!(tempo_contribution(-1.0), 5);
        assert_eq!(tempo_contribution(2.5), 3);
        assert_eq!(tempo_contribution(6.0), 1);
        assert_eq!(tempo_contribution(7.5), 0);
    }
}
