//! autodeck-midi: MIDI realisation of the device command channel
//!
//! Each [`DeviceCommand`](autodeck_core::DeviceCommand) is mapped to a MIDI
//! control through a YAML profile and sent to an output port that the DJ
//! application listens on (typically a virtual loopback port).
//!
//! - Momentary commands (browse moves, load, play) are sent as a press and
//!   release: Note On 127 followed by Note Off, or CC 127 followed by CC 0
//! - Continuous commands (volume, crossfader, EQ) are sent as a single CC
//!   with the 0.0-1.0 level scaled to 0-127
//!
//! Nothing is read back from the application.

pub mod config;
pub mod connection;
pub mod normalize;
pub mod output;

pub use config::{default_midi_map_path, load_midi_map, MidiCommandMap, MidiControlConfig};
pub use connection::{list_output_ports, MidiConnectionError};
pub use output::{encode_command, MidiCommandChannel};
