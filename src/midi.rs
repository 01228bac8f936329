//! MIDI utilities and message types
//!
//! Provides MIDI message parsing, encoding, and the decoded event shape handed
//! to the dispatcher.

pub mod device;
pub mod nrpn;

use std::fmt;

pub use nrpn::{Nrpn, NrpnAssembler};

/// Largest 7-bit data value
pub const MAX_MIDI: u16 = 0x7F;

/// Largest 14-bit data value (pitch bend, NRPN)
pub const MAX_NRPN: u16 = 0x3FFF;

/// Number of MIDI channels
pub const CHANNELS: usize = 16;

/// MIDI channel messages this gateway understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note Off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff { channel: u8, note: u8, velocity: u8 },

    /// Note On: channel (0-15), note (0-127), velocity (0-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },

    /// Pitch Bend: channel (0-15), value (0-16383, 14-bit)
    PitchBend { channel: u8, value: u16 },
}

impl MidiMessage {
    /// Parse a MIDI message from raw bytes
    ///
    /// Note On with velocity zero stays a Note On; controllers that use it as a
    /// release still deliver a value of 0 to the bound command.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;
        if !(0x80..0xF0).contains(&status) {
            return None;
        }
        if rest.len() < 2 {
            return None;
        }

        let channel = status & 0x0F;
        let data1 = rest[0] & 0x7F;
        let data2 = rest[1] & 0x7F;

        match status & 0xF0 {
            0x80 => Some(MidiMessage::NoteOff {
                channel,
                note: data1,
                velocity: data2,
            }),
            0x90 => Some(MidiMessage::NoteOn {
                channel,
                note: data1,
                velocity: data2,
            }),
            0xB0 => Some(MidiMessage::ControlChange {
                channel,
                cc: data1,
                value: data2,
            }),
            0xE0 => Some(MidiMessage::PitchBend {
                channel,
                value: ((data2 as u16) << 7) | data1 as u16,
            }),
            _ => None,
        }
    }

    /// Encode the message to MIDI bytes
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                vec![0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                vec![0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                vec![0xB0 | (channel & 0x0F), cc & 0x7F, value & 0x7F]
            }
            MidiMessage::PitchBend { channel, value } => {
                let lsb = (value & 0x7F) as u8;
                let msb = ((value >> 7) & 0x7F) as u8;
                vec![0xE0 | (channel & 0x0F), lsb, msb]
            }
        }
    }

    /// Channel (0-15)
    pub fn channel(&self) -> u8 {
        match *self {
            MidiMessage::NoteOff { channel, .. }
            | MidiMessage::NoteOn { channel, .. }
            | MidiMessage::ControlChange { channel, .. }
            | MidiMessage::PitchBend { channel, .. } => channel,
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                write!(f, "NoteOff ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                write!(f, "NoteOn ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, cc, value)
            }
            MidiMessage::PitchBend { channel, value } => {
                write!(f, "PitchBend ch:{} v:{}", channel + 1, value)
            }
        }
    }
}

/// Kind of a decoded controller event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ControlChange,
    NoteOn,
    PitchBend,
}

/// Decoded hardware event, after NRPN reassembly
///
/// `number` is the CC number (0-127), the assembled NRPN parameter (up to
/// 16383), or the note number. Pitch bend carries number 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MidiEvent {
    pub channel: u8,
    pub number: u16,
    pub kind: EventKind,
    pub value: u16,
}

impl MidiEvent {
    pub fn control_change(channel: u8, number: u16, value: u16) -> Self {
        Self {
            channel,
            number,
            kind: EventKind::ControlChange,
            value,
        }
    }

    pub fn note_on(channel: u8, number: u16, value: u16) -> Self {
        Self {
            channel,
            number,
            kind: EventKind::NoteOn,
            value,
        }
    }

    pub fn pitch_bend(channel: u8, value: u16) -> Self {
        Self {
            channel,
            number: 0,
            kind: EventKind::PitchBend,
            value,
        }
    }

    /// Convert a parsed message into an event, without NRPN handling
    ///
    /// Note Off carries no command and yields `None`.
    pub fn from_message(message: &MidiMessage) -> Option<Self> {
        match *message {
            MidiMessage::NoteOn { channel, note, velocity } => {
                Some(Self::note_on(channel, note as u16, velocity as u16))
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                Some(Self::control_change(channel, cc as u16, value as u16))
            }
            MidiMessage::PitchBend { channel, value } => Some(Self::pitch_bend(channel, value)),
            MidiMessage::NoteOff { .. } => None,
        }
    }
}

impl fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} ch:{} #{} v:{}",
            self.kind,
            self.channel + 1,
            self.number,
            self.value
        )
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
