//! Session configuration
//!
//! Configuration is stored as YAML. Default location:
//! `~/.config/autodeck/config.yaml`.
//!
//! All timing values are empirical defaults for a typical DJ application and
//! should be validated against the actual device. Settle delays may be tuned
//! but never set to zero: a command sent before the previous one is processed
//! is silently dropped.
//!
//! ```yaml
//! timing:
//!   settle:
//!     folder_ms: 150
//!     track_ms: 60
//!   crossfade_secs: 8.0
//!   trigger_bars: 32.0
//! genres:
//!   house:
//!     root: [House]
//!     default_bpm: 124.0
//!     default_key: 8A
//!     energy: 0.6
//! ```

mod io;
mod paths;

pub use io::{load_config, save_config, try_load_config};
pub use paths::{default_config_path, default_data_dir};

use crate::device::CommandClass;
use crate::matcher::DEFAULT_TEMPO_TOLERANCE_PCT;
use crate::music::HarmonicKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Error type for configuration validation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoDeckConfig {
    pub timing: TimingConfig,
    pub navigation: NavigationConfig,
    pub matching: MatchingConfig,
    pub mixer: MixerConfig,
    /// Genre name (lowercase) → catalog root and fallback criteria
    pub genres: BTreeMap<String, GenreProfile>,
    /// Catalog YAML exported by the import tool
    pub catalog_path: PathBuf,
    /// Where session reports are written; `None` disables persistence
    pub session_log_dir: Option<PathBuf>,
    pub decision: DecisionConfig,
}

impl Default for AutoDeckConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        let mut genres = BTreeMap::new();
        genres.insert(
            "house".to_string(),
            GenreProfile {
                root: vec!["House".to_string()],
                default_bpm: 124.0,
                default_key: HarmonicKey::minor(8),
                energy: 0.6,
            },
        );
        genres.insert(
            "techno".to_string(),
            GenreProfile {
                root: vec!["Techno".to_string()],
                default_bpm: 130.0,
                default_key: HarmonicKey::minor(5),
                energy: 0.75,
            },
        );

        Self {
            timing: TimingConfig::default(),
            navigation: NavigationConfig::default(),
            matching: MatchingConfig::default(),
            mixer: MixerConfig::default(),
            genres,
            catalog_path: data_dir.join("catalog.yaml"),
            session_log_dir: Some(data_dir.join("sessions")),
            decision: DecisionConfig::default(),
        }
    }
}

impl AutoDeckConfig {
    /// Check every constraint the session relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timing.validate()?;
        self.navigation.validate()?;

        if !(self.matching.tempo_tolerance_pct > 0.0 && self.matching.tempo_tolerance_pct < 100.0) {
            return Err(ConfigError::Invalid(format!(
                "matching.tempo_tolerance_pct must be within (0, 100), got {}",
                self.matching.tempo_tolerance_pct
            )));
        }
        if self.matching.shortlist_len == 0 {
            return Err(ConfigError::Invalid("matching.shortlist_len must be at least 1".into()));
        }
        for (name, genre) in &self.genres {
            if !(genre.default_bpm.is_finite() && genre.default_bpm > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "genre '{}' has non-positive default_bpm",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Look up a genre profile (case-insensitive)
    pub fn genre(&self, name: &str) -> Option<&GenreProfile> {
        self.genres.get(&name.to_lowercase())
    }
}

/// Minimum wait after each command class before the next command may be sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettleDelays {
    pub folder_ms: u64,
    pub track_ms: u64,
    pub load_ms: u64,
    pub transport_ms: u64,
    pub mixer_ms: u64,
}

impl Default for SettleDelays {
    fn default() -> Self {
        Self {
            folder_ms: 150,
            track_ms: 60,
            load_ms: 1000,
            transport_ms: 200,
            mixer_ms: 10,
        }
    }
}

impl SettleDelays {
    /// Same delay for every class (tests, simulated devices)
    pub fn uniform(ms: u64) -> Self {
        Self {
            folder_ms: ms,
            track_ms: ms,
            load_ms: ms,
            transport_ms: ms,
            mixer_ms: ms,
        }
    }

    /// Delay for a command class
    pub fn for_class(&self, class: CommandClass) -> Duration {
        let ms = match class {
            CommandClass::FolderMove => self.folder_ms,
            CommandClass::TrackMove => self.track_ms,
            CommandClass::Load => self.load_ms,
            CommandClass::Transport => self.transport_ms,
            CommandClass::Mixer => self.mixer_ms,
        };
        Duration::from_millis(ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let entries = [
            ("folder_ms", self.folder_ms),
            ("track_ms", self.track_ms),
            ("load_ms", self.load_ms),
            ("transport_ms", self.transport_ms),
            ("mixer_ms", self.mixer_ms),
        ];
        for (name, value) in entries {
            if value == 0 {
                return Err(ConfigError::Invalid(format!(
                    "timing.settle.{} must be greater than zero",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Session timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub settle: SettleDelays,
    /// Length of the crossfader ramp between decks
    pub crossfade_secs: f64,
    /// Interval between crossfader steps
    pub crossfade_step_ms: u64,
    /// Length of the closing volume fade
    pub fade_out_secs: f64,
    /// Remaining bars on the active deck that trigger loading the next track
    pub trigger_bars: f64,
    pub beats_per_bar: u32,
    /// Cadence of the Playing-state monitor
    pub poll_interval_ms: u64,
    /// Upper bound on a decision service call
    pub decision_timeout_ms: u64,
    /// Wait before re-checking the trigger after a failed load cycle
    pub load_retry_secs: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle: SettleDelays::default(),
            crossfade_secs: 8.0,
            crossfade_step_ms: 100,
            fade_out_secs: 6.0,
            trigger_bars: 32.0,
            beats_per_bar: 4,
            poll_interval_ms: 500,
            decision_timeout_ms: 5000,
            load_retry_secs: 10.0,
        }
    }
}

impl TimingConfig {
    pub fn crossfade(&self) -> Duration {
        Duration::try_from_secs_f64(self.crossfade_secs).unwrap_or_default()
    }

    pub fn crossfade_step(&self) -> Duration {
        Duration::from_millis(self.crossfade_step_ms)
    }

    pub fn fade_out(&self) -> Duration {
        Duration::try_from_secs_f64(self.fade_out_secs).unwrap_or_default()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn decision_timeout(&self) -> Duration {
        Duration::from_millis(self.decision_timeout_ms)
    }

    pub fn load_retry(&self) -> Duration {
        Duration::try_from_secs_f64(self.load_retry_secs).unwrap_or_default()
    }

    /// Number of crossfader steps in a full ramp (at least one)
    pub fn crossfade_steps(&self) -> u32 {
        let step = self.crossfade_step().as_secs_f64();
        if step <= 0.0 {
            return 1;
        }
        ((self.crossfade_secs / step).round() as u32).max(1)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.settle.validate()?;

        if self.crossfade_step_ms == 0 {
            return Err(ConfigError::Invalid("timing.crossfade_step_ms must be greater than zero".into()));
        }
        if !(self.crossfade_secs.is_finite() && self.crossfade_secs > 0.0) {
            return Err(ConfigError::Invalid("timing.crossfade_secs must be positive".into()));
        }
        check_seconds("timing.crossfade_secs", self.crossfade_secs)?;
        check_seconds("timing.fade_out_secs", self.fade_out_secs)?;
        check_seconds("timing.load_retry_secs", self.load_retry_secs)?;
        if self.crossfade_step().as_secs_f64() > self.crossfade_secs {
            return Err(ConfigError::Invalid(
                "timing.crossfade_step_ms must not exceed the crossfade length".into(),
            ));
        }
        if self.crossfade_step_ms < self.settle.mixer_ms {
            return Err(ConfigError::Invalid(
                "timing.crossfade_step_ms must be at least the mixer settle delay".into(),
            ));
        }
        if !(self.trigger_bars.is_finite() && self.trigger_bars > 0.0) {
            return Err(ConfigError::Invalid("timing.trigger_bars must be positive".into()));
        }
        if self.beats_per_bar == 0 {
            return Err(ConfigError::Invalid("timing.beats_per_bar must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 || self.decision_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "timing.poll_interval_ms and timing.decision_timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Longest accepted value for any seconds field in `timing`
const MAX_TIMING_SECS: f64 = 86_400.0;

/// Seconds fields must be finite, non-negative and at most a day
fn check_seconds(field: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=MAX_TIMING_SECS).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{} must be between 0 and {} seconds, got {}",
            field, MAX_TIMING_SECS, value
        )))
    }
}

/// Bounds of the browse hierarchy, used to size re-homing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Deepest folder nesting the device can show
    pub max_depth: usize,
    /// Most rows a single folder list can hold
    pub max_breadth: usize,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            max_depth: 4,
            max_breadth: 32,
        }
    }
}

impl NavigationConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth == 0 || self.max_breadth == 0 {
            return Err(ConfigError::Invalid(
                "navigation.max_depth and navigation.max_breadth must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Matcher parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub tempo_tolerance_pct: f64,
    /// How many ranked candidates are offered to the decision service
    pub shortlist_len: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            tempo_tolerance_pct: DEFAULT_TEMPO_TOLERANCE_PCT,
            shortlist_len: 5,
        }
    }
}

/// Mixer levels applied by the session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    /// Channel volume of a playing deck
    pub play_volume: f32,
    /// Neutral EQ gain
    pub eq_neutral: f32,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            play_volume: 0.85,
            eq_neutral: 0.5,
        }
    }
}

/// Per-genre catalog root and fallback selection criteria
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreProfile {
    /// Folder names of the genre's subtree in the browse hierarchy
    pub root: Vec<String>,
    /// Reference tempo when nothing better is known
    pub default_bpm: f64,
    /// Reference key when nothing better is known
    pub default_key: HarmonicKey,
    /// Energy level target handed to the decision service (0.0-1.0)
    #[serde(default = "default_energy")]
    pub energy: f32,
}

fn default_energy() -> f32 {
    0.5
}

/// External decision service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// HTTP endpoint accepting JSON decision requests; `None` = matcher only
    pub endpoint: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        AutoDeckConfig::default().validate().unwrap();
    }

    #[test]
    fn test_zero_settle_delay_rejected() {
        let mut config = AutoDeckConfig::default();
        config.timing.settle.track_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_crossfade_step_must_fit() {
        let mut config = AutoDeckConfig::default();
        config.timing.crossfade_step_ms = 9000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_finite_seconds_rejected() {
        for bad in [f64::INFINITY, f64::NAN, -1.0, 1e300, MAX_TIMING_SECS + 1.0] {
            let mut config = AutoDeckConfig::default();
            config.timing.fade_out_secs = bad;
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))), "fade_out_secs {}", bad);

            let mut config = AutoDeckConfig::default();
            config.timing.load_retry_secs = bad;
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))), "load_retry_secs {}", bad);
        }

        let mut config = AutoDeckConfig::default();
        config.timing.fade_out_secs = 0.0;
        config.timing.load_retry_secs = 0.0;
        config.validate().unwrap();
    }

    #[test]
    fn test_yaml_infinity_rejected() {
        let config: AutoDeckConfig = serde_yaml::from_str("timing:\n  fade_out_secs: .inf\n").unwrap();
        assert!(config.timing.fade_out_secs.is_infinite());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_crossfade_steps() {
        let timing = TimingConfig::default();
        assert_eq!(timing.crossfade_steps(), 80);
    }

    #[test]
    fn test_folder_moves_settle_longer_than_track_moves() {
        let settle = SettleDelays::default();
        assert!(settle.for_class(CommandClass::FolderMove) > settle.for_class(CommandClass::TrackMove));
    }

    #[test]
    fn test_genre_lookup_case_insensitive() {
        let config = AutoDeckConfig::default();
        assert!(config.genre("House").is_some());
        assert!(config.genre("polka").is_none());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: AutoDeckConfig = serde_yaml::from_str(
            r#"
timing:
  crossfade_secs: 4.0
genres:
  dnb:
    root: [DnB, Liquid]
    default_bpm: 174.0
    default_key: 10A
"#,
        )
        .unwrap();
        assert_eq!(config.timing.crossfade_secs, 4.0);
        assert_eq!(config.timing.trigger_bars, 32.0);
        let dnb = config.genre("dnb").unwrap();
        assert_eq!(dnb.energy, 0.5);
        assert_eq!(dnb.default_key, HarmonicKey::minor(10));
        config.validate().unwrap();
    }
}
