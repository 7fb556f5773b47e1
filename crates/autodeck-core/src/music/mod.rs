//! Music theory utilities for harmonic matching
//!
//! Keys are compared on the harmonic wheel: 12 positions, each in a minor
//! (`A`) or major (`B`) mode. Catalog files may use wheel notation ("8A")
//! or musical notation ("Am", "F#"); the latter is parsed through
//! [`MusicalKey`] and mapped onto the wheel.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Key written in letter notation ("Am", "F#", "Dbmaj")
///
/// Only used on the way in: catalog keys are stored and compared as
/// [`HarmonicKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MusicalKey {
    /// Pitch class of the tonic, 0 = C
    pub pitch_class: u8,
    pub minor: bool,
}

impl MusicalKey {
    pub const fn new(pitch_class: u8, minor: bool) -> Self {
        Self {
            pitch_class: pitch_class % 12,
            minor,
        }
    }

    /// Letter, optional `#`/`b`, optional mode suffix (`m`, `min`, `maj`)
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let mut rest = s.chars();
        let natural: u8 = match rest.next()?.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };

        let mut suffix = rest.as_str();
        let mut pitch_class = natural;
        if let Some(tail) = suffix.strip_prefix('#') {
            pitch_class = (natural + 1) % 12;
            suffix = tail;
        } else if let Some(tail) = suffix.strip_prefix('b') {
            pitch_class = (natural + 11) % 12;
            suffix = tail;
        }

        let minor = match suffix.to_lowercase().as_str() {
            "" | "maj" | "major" => false,
            "m" | "min" | "minor" => true,
            _ => return None,
        };
        Some(Self::new(pitch_class, minor))
    }

    /// Position on the harmonic wheel
    ///
    /// Each clockwise step is a fifth up. C major and A minor share 8.
    pub fn wheel_position(&self) -> u8 {
        let fifths = (self.pitch_class as u16 * 7 % 12) as u8;
        let offset = if self.minor { 4 } else { 7 };
        (fifths + offset) % 12 + 1
    }
}

impl fmt::Display for MusicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
        let suffix = if self.minor { "m" } else { "" };
        write!(f, "{}{}", NAMES[self.pitch_class as usize], suffix)
    }
}

/// Scale half of the harmonic wheel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Minor keys, written `A` on the wheel
    Minor,
    /// Major keys, written `B` on the wheel
    Major,
}

impl Mode {
    /// Wheel letter for this mode
    pub fn letter(self) -> char {
        match self {
            Mode::Minor => 'A',
            Mode::Major => 'B',
        }
    }

    /// The other mode (relative major/minor switch)
    pub fn opposite(self) -> Self {
        match self {
            Mode::Minor => Mode::Major,
            Mode::Major => Mode::Minor,
        }
    }

    fn from_letter(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(Mode::Minor),
            'B' => Some(Mode::Major),
            _ => None,
        }
    }
}

/// One of the 24 harmonic wheel symbols (position 1-12 paired with a mode)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HarmonicKey {
    position: u8,
    mode: Mode,
}

impl HarmonicKey {
    /// Create a key; `position` must be within 1..=12
    pub fn new(position: u8, mode: Mode) -> Option<Self> {
        (1..=12).contains(&position).then_some(Self { position, mode })
    }

    /// Minor key at `position` (panics outside 1..=12; for literals)
    pub const fn minor(position: u8) -> Self {
        assert!(position >= 1 && position <= 12);
        Self { position, mode: Mode::Minor }
    }

    /// Major key at `position` (panics outside 1..=12; for literals)
    pub const fn major(position: u8) -> Self {
        assert!(position >= 1 && position <= 12);
        Self { position, mode: Mode::Major }
    }

    /// Wheel position (1-12)
    pub fn position(&self) -> u8 {
        self.position
    }

    /// Wheel mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Parse wheel notation ("8A", "12b") or musical notation ("Am", "F#")
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let mut chars = s.chars();
        let last = chars.next_back()?;
        let digits = chars.as_str();

        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            let position: u8 = digits.parse().ok()?;
            return Self::new(position, Mode::from_letter(last)?);
        }

        MusicalKey::parse(s).map(Self::from)
    }

    /// Circular distance between wheel positions, ignoring mode (0-6)
    pub fn distance(&self, other: &HarmonicKey) -> u8 {
        let diff = self.position.abs_diff(other.position);
        diff.min(12 - diff)
    }

    /// Move around the wheel by `steps` (negative = counter-clockwise), keeping the mode
    pub fn step(&self, steps: i8) -> Self {
        let zero_based = (self.position as i16 - 1 + steps as i16).rem_euclid(12);
        Self {
            position: zero_based as u8 + 1,
            mode: self.mode,
        }
    }

    /// Same position in the other mode (relative major/minor)
    pub fn relative(&self) -> Self {
        Self {
            position: self.position,
            mode: self.mode.opposite(),
        }
    }

    /// Keys reachable with a nonzero harmonic contribution
    ///
    /// Identity, relative, ±1 and ±2 in the same mode. Used to build the key
    /// set for catalog queries.
    pub fn compatible_set(&self) -> Vec<HarmonicKey> {
        vec![
            *self,
            self.relative(),
            self.step(1),
            self.step(-1),
            self.step(2),
            self.step(-2),
        ]
    }
}

impl From<MusicalKey> for HarmonicKey {
    fn from(key: MusicalKey) -> Self {
        Self {
            position: key.wheel_position(),
            mode: if key.minor { Mode::Minor } else { Mode::Major },
        }
    }
}

impl fmt::Display for HarmonicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.position, self.mode.letter())
    }
}

impl TryFrom<String> for HarmonicKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unrecognised key '{}'", value))
    }
}

impl From<HarmonicKey> for String {
    fn from(key: HarmonicKey) -> Self {
        key.to_string()
    }
}
