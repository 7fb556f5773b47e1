//! Finding and opening the DJ application's MIDI input
//!
//! autodeck only sends, so only midir output ports are enumerated.

use midir::{MidiOutput, MidiOutputConnection};

/// Why an output port could not be opened
#[derive(Debug, thiserror::Error)]
pub enum MidiConnectionError {
    #[error("MIDI backend unavailable: {0}")]
    OutputInitError(String),

    #[error("No MIDI output ports available")]
    NoOutputPorts,

    #[error("No MIDI output port name contains '{0}'")]
    PortNotFound(String),

    #[error("Could not open MIDI output port: {0}")]
    ConnectionError(String),
}

/// Case-insensitive substring match of a port name
pub(crate) fn port_matches(name: &str, pattern: &str) -> bool {
    name.to_lowercase().contains(&pattern.to_lowercase())
}

/// Find the first output port matching `port_match` and connect to it
///
/// Returns the connection and the full port name.
pub fn connect_output(port_match: &str) -> Result<(MidiOutputConnection, String), MidiConnectionError> {
    let midi_out = MidiOutput::new("autodeck-out")
        .map_err(|e| MidiConnectionError::OutputInitError(e.to_string()))?;

    let out_ports = midi_out.ports();
    if out_ports.is_empty() {
        return Err(MidiConnectionError::NoOutputPorts);
    }

    let (port, port_name) = out_ports
        .iter()
        .find_map(|port| {
            let name = midi_out.port_name(port).ok()?;
            port_matches(&name, port_match).then_some((port, name))
        })
        .ok_or_else(|| MidiConnectionError::PortNotFound(port_match.to_string()))?;

    let connection = midi_out
        .connect(port, "autodeck-output")
        .map_err(|e| MidiConnectionError::ConnectionError(e.to_string()))?;
    log::info!("MIDI: Opened output port '{}' (matched '{}')", port_name, port_match);

    Ok((connection, port_name))
}

/// Names of every MIDI output port, for `--list-ports`
pub fn list_output_ports() -> Result<Vec<String>, MidiConnectionError> {
    let midi_out = MidiOutput::new("autodeck-list")
        .map_err(|e| MidiConnectionError::OutputInitError(e.to_string()))?;

    Ok(midi_out
        .ports()
        .iter()
        .filter_map(|port| midi_out.port_name(port).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_matching() {
        assert!(port_matches("loopMIDI Port 1", "loopmidi"));
        assert!(port_matches("Autodeck Virtual:autodeck 128:0", "AUTODECK"));
        assert!(!port_matches("Midi Through Port-0", "autodeck"));
    }

    #[test]
    fn test_list_ports_does_not_panic() {
        // Port availability depends on the system; this only must not panic
        let _ports = list_output_ports();
    }
}
