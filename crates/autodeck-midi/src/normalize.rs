//! Value scaling for MIDI controls
//!
//! Device levels are 0.0-1.0 (EQ with 0.5 as neutral); MIDI data bytes are
//! 0-127. 0.5 lands on 64 so EQ controls center exactly.

/// Value sent for a pressed button
pub const PRESSED: u8 = 127;

/// Value sent for a released button
pub const RELEASED: u8 = 0;

/// Scale a 0.0-1.0 level to a 7-bit MIDI value (clamped)
pub fn unit_to_midi(value: f32) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    (value.clamp(0.0, 1.0) * 127.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_to_midi_bounds() {
        assert_eq!(unit_to_midi(0.0), 0);
        assert_eq!(unit_to_midi(1.0), 127);
        assert_eq!(unit_to_midi(0.5), 64);
        assert_eq!(unit_to_midi(-3.0), 0);
        assert_eq!(unit_to_midi(7.0), 127);
        assert_eq!(unit_to_midi(f32::NAN), 0);
    }

    #[test]
    fn test_every_value_reachable() {
        for value in 0..=127u8 {
            assert_eq!(unit_to_midi(value as f32 / 127.0), value);
        }
    }
}
