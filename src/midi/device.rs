//! MIDI port access via midir
//!
//! [`MidiReceiver`] opens controller inputs and turns raw bytes into
//! [`MidiEvent`]s (reassembling NRPN on the way); [`MidiSender`] writes
//! recenter messages back to the controller.

use anyhow::{anyhow, Context, Result};
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::nrpn::{is_nrpn_control, NrpnAssembler};
use super::{format_hex, MidiEvent, MidiMessage};

/// Outbound MIDI to the controller
pub trait MidiSink: Send + Sync {
    fn send(&self, message: &MidiMessage) -> Result<()>;
}

/// Case-insensitive substring match used for port selection
fn port_matches(name: &str, pattern: &str) -> bool {
    pattern.is_empty() || name.to_lowercase().contains(&pattern.to_lowercase())
}

/// List available MIDI input ports
pub fn list_input_ports() -> Result<Vec<String>> {
    let midi_in = MidiInput::new("MIDI-Host-GW-Scanner")?;
    Ok(midi_in
        .ports()
        .iter()
        .filter_map(|p| midi_in.port_name(p).ok())
        .collect())
}

/// List available MIDI output ports
pub fn list_output_ports() -> Result<Vec<String>> {
    let midi_out = MidiOutput::new("MIDI-Host-GW-Scanner")?;
    Ok(midi_out
        .ports()
        .iter()
        .filter_map(|p| midi_out.port_name(p).ok())
        .collect())
}

/// Decoder run inside one input callback
///
/// Owns the NRPN state for its port, so no locking is needed.
#[derive(Debug, Default)]
pub struct EventDecoder {
    nrpn: NrpnAssembler,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode raw bytes, returning an event when one is complete
    pub fn decode(&mut self, data: &[u8]) -> Option<MidiEvent> {
        let message = MidiMessage::parse(data)?;
        if let MidiMessage::ControlChange { channel, cc, value } = message {
            if is_nrpn_control(cc) {
                return match self.nrpn.process(channel, cc, value) {
                    Ok(Some(nrpn)) => Some(MidiEvent::control_change(
                        channel,
                        nrpn.control,
                        nrpn.value,
                    )),
                    Ok(None) => None,
                    Err(e) => {
                        warn!("NRPN decode failed: {}", e);
                        None
                    }
                };
            }
        }
        MidiEvent::from_message(&message)
    }
}

/// Open input connections feeding one event channel
pub struct MidiReceiver {
    connections: Vec<MidiInputConnection<()>>,
}

impl MidiReceiver {
    /// Open every input port matching one of `patterns` (all ports if empty)
    pub fn open(patterns: &[String], event_tx: mpsc::UnboundedSender<MidiEvent>) -> Result<Self> {
        let scanner = MidiInput::new("MIDI-Host-GW-Scanner").context("Failed to create MIDI input")?;
        let ports = scanner.ports();
        debug!("Found {} MIDI input ports", ports.len());

        let mut connections = Vec::new();
        for port in &ports {
            let name = match scanner.port_name(port) {
                Ok(n) => n,
                Err(_) => continue,
            };
            if !patterns.is_empty() && !patterns.iter().any(|p| port_matches(&name, p)) {
                continue;
            }

            let midi_in = MidiInput::new("MIDI-Host-GW-Input")?;
            let tx = event_tx.clone();
            let mut decoder = EventDecoder::new();
            let log_name = name.clone();

            match midi_in.connect(
                port,
                "MIDI-Host-GW",
                move |_timestamp, data, _| {
                    trace!("MIDI in [{}] {}", log_name, format_hex(data));
                    if let Some(event) = decoder.decode(data) {
                        // Receiver gone means we are shutting down
                        let _ = tx.send(event);
                    }
                },
                (),
            ) {
                Ok(conn) => {
                    info!("Opened MIDI input: {}", name);
                    connections.push(conn);
                }
                Err(e) => warn!("Failed to open MIDI input {}: {}", name, e),
            }
        }

        if connections.is_empty() {
            warn!("No MIDI input ports opened (patterns: {:?})", patterns);
        }
        Ok(Self { connections })
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Close all input connections
    pub fn close(&mut self) {
        for conn in self.connections.drain(..) {
            conn.close();
        }
        debug!("MIDI inputs closed");
    }
}

/// MIDI output to the controller, used for recentering
pub struct MidiSender {
    port_name: String,
    conn: Mutex<Option<MidiOutputConnection>>,
}

impl MidiSender {
    /// Connect to the first output port matching `pattern`
    pub fn open(pattern: &str) -> Result<Self> {
        let midi_out = MidiOutput::new("MIDI-Host-GW-Output").context("Failed to create MIDI output")?;

        let (port, port_name) = midi_out
            .ports()
            .into_iter()
            .find_map(|p| {
                let name = midi_out.port_name(&p).ok()?;
                port_matches(&name, pattern).then_some((p, name))
            })
            .ok_or_else(|| anyhow!("Output port '{}' not found", pattern))?;

        info!("Connecting to output port: {}", port_name);
        let conn = midi_out
            .connect(&port, "MIDI-Host-GW")
            .map_err(|e| anyhow!("Failed to connect to output port: {}", e))?;

        Ok(Self {
            port_name,
            conn: Mutex::new(Some(conn)),
        })
    }
}

impl MidiSink for MidiSender {
    fn send(&self, message: &MidiMessage) -> Result<()> {
        let data = message.encode();
        let mut guard = self.conn.lock();
        let conn = guard
            .as_mut()
            .ok_or_else(|| anyhow!("MIDI output '{}' not connected", self.port_name))?;
        if let Err(e) = conn.send(&data) {
            warn!("MIDI send to '{}' failed: {}", self.port_name, e);
            *guard = None;
            return Err(anyhow!("MIDI send failed: {}", e));
        }
        debug!("Sent: {} | {}", format_hex(&data), message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::nrpn::{CONTROL_LSB, CONTROL_MSB, VALUE_LSB, VALUE_MSB};

    #[test]
    fn test_decoder_passes_plain_messages() {
        let mut decoder = EventDecoder::new();
        assert_eq!(
            decoder.decode(&[0xB0, 7, 100]),
            Some(MidiEvent::control_change(0, 7, 100))
        );
        assert_eq!(
            decoder.decode(&[0xE1, 0x00, 0x40]),
            Some(MidiEvent::pitch_bend(1, 8192))
        );
        assert_eq!(decoder.decode(&[0x81, 60, 0]), None);
    }

    #[test]
    fn test_decoder_reassembles_nrpn() {
        let mut decoder = EventDecoder::new();
        assert_eq!(decoder.decode(&[0xB2, CONTROL_MSB, 2]), None);
        assert_eq!(decoder.decode(&[0xB2, CONTROL_LSB, 1]), None);
        assert_eq!(decoder.decode(&[0xB2, VALUE_MSB, 64]), None);
        assert_eq!(
            decoder.decode(&[0xB2, VALUE_LSB, 0]),
            Some(MidiEvent::control_change(2, 257, 8192))
        );
    }

    #[test]
    fn test_port_matching_is_case_insensitive() {
        assert!(port_matches("X-TOUCH MINI", "x-touch"));
        assert!(port_matches("anything", ""));
        assert!(!port_matches("Launchpad", "x-touch"));
    }
}
