//! MIDI command channel
//!
//! Encodes device commands into MIDI bytes and writes them to the output
//! port. Encoding is a pure function so mappings can be checked without a
//! port.

use crate::config::{MidiCommandMap, MidiControlConfig};
use crate::connection::{connect_output, MidiConnectionError};
use crate::normalize::{unit_to_midi, PRESSED, RELEASED};
use autodeck_core::device::{CommandChannel, DeviceCommand, DeviceError};
use midir::MidiOutputConnection;
use std::sync::Mutex;

/// Raw 3-byte channel message
pub type MidiMessage = [u8; 3];

fn message(control: MidiControlConfig, value: u8) -> MidiMessage {
    match control {
        MidiControlConfig::Note { channel, note } => {
            if value > 0 {
                [0x90 | channel, note, value]
            } else {
                [0x80 | channel, note, 0]
            }
        }
        MidiControlConfig::ControlChange { channel, cc } => [0xB0 | channel, cc, value],
    }
}

/// MIDI messages for one command, in send order
///
/// Momentary commands become a press/release pair; level commands a single
/// message carrying the scaled level.
pub fn encode_command(map: &MidiCommandMap, command: &DeviceCommand) -> Vec<MidiMessage> {
    let control = map.control_for(command);
    let level = match *command {
        DeviceCommand::SetVolume { level, .. } | DeviceCommand::SetEq { level, .. } => Some(level),
        DeviceCommand::SetCrossfader { position } => Some(position),
        _ => None,
    };

    match level {
        Some(level) => vec![message(control, unit_to_midi(level))],
        None => vec![message(control, PRESSED), message(control, RELEASED)],
    }
}

/// Send-only channel writing to a MIDI output port
pub struct MidiCommandChannel {
    connection: Mutex<MidiOutputConnection>,
    map: MidiCommandMap,
    port_name: String,
}

impl MidiCommandChannel {
    /// Connect to the port named by the profile's `port_match`
    pub fn connect(map: MidiCommandMap) -> Result<Self, MidiConnectionError> {
        let (connection, port_name) = connect_output(&map.port_match)?;
        Ok(Self {
            connection: Mutex::new(connection),
            map,
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl CommandChannel for MidiCommandChannel {
    fn send(&self, command: &DeviceCommand) -> Result<(), DeviceError> {
        let mut connection = self.connection.lock().map_err(|_| DeviceError::Disconnected)?;
        for bytes in encode_command(&self.map, command) {
            log::debug!(
                "[MIDI OUT] {} -> {:02X} {:02X} {:02X}",
                command,
                bytes[0],
                bytes[1],
                bytes[2]
            );
            connection.send(&bytes).map_err(|e| {
                log::warn!("MIDI output: Failed to send message: {}", e);
                DeviceError::SendFailed {
                    command: command.to_string(),
                    reason: e.to_string(),
                }
            })?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.port_name
    }
}
