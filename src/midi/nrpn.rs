//! NRPN reassembly
//!
//! A Non-Registered Parameter Number arrives as four control changes on one
//! channel: parameter MSB (99), parameter LSB (98), data entry MSB (6) and data
//! entry LSB (38). [`NrpnAssembler`] latches them per channel and emits one
//! 14-bit (parameter, value) pair when a full cycle has been seen.
//!
//! The assembler is owned by a single MIDI input callback and needs no locking.
//! Senders that omit the fourth message get nothing: the partial cycle is
//! discarded when the next parameter MSB arrives.

use crate::error::{BridgeError, Result};
use crate::midi::CHANNELS;

/// Parameter number MSB controller
pub const CONTROL_MSB: u8 = 99;
/// Parameter number LSB controller
pub const CONTROL_LSB: u8 = 98;
/// Data entry MSB controller
pub const VALUE_MSB: u8 = 6;
/// Data entry LSB controller
pub const VALUE_LSB: u8 = 38;

const READY_CONTROL_MSB: u8 = 0b0001;
const READY_CONTROL_LSB: u8 = 0b0010;
const READY_VALUE_MSB: u8 = 0b0100;
const READY_VALUE_LSB: u8 = 0b1000;
const READY_CONTROL: u8 = READY_CONTROL_MSB | READY_CONTROL_LSB;
const READY_ALL: u8 = READY_CONTROL | READY_VALUE_MSB | READY_VALUE_LSB;

/// Parameter selection 127/127 is the null function
const NULL_FUNCTION: u8 = 0x7F;

/// A completed NRPN: 14-bit parameter number and 14-bit value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nrpn {
    pub control: u16,
    pub value: u16,
}

/// Is this controller number one of the four NRPN components?
pub fn is_nrpn_control(cc: u8) -> bool {
    matches!(cc, CONTROL_MSB | CONTROL_LSB | VALUE_MSB | VALUE_LSB)
}

/// Per-channel NRPN state machine
#[derive(Debug, Default, Clone)]
pub struct NrpnAssembler {
    control_msb: [u8; CHANNELS],
    control_lsb: [u8; CHANNELS],
    value_msb: [u8; CHANNELS],
    value_lsb: [u8; CHANNELS],
    ready: [u8; CHANNELS],
}

impl NrpnAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one control change
    ///
    /// Returns `Ok(Some(..))` exactly once per complete four-message cycle.
    /// Controllers other than the NRPN components are ignored.
    pub fn process(&mut self, channel: u8, control: u8, value: u8) -> Result<Option<Nrpn>> {
        let ch = channel as usize;
        if ch >= CHANNELS {
            return Err(BridgeError::ChannelOutOfRange(channel));
        }
        let value = value & 0x7F;

        match control {
            CONTROL_MSB => {
                self.control_msb[ch] = value;
                self.select_control(ch, READY_CONTROL_MSB);
            }
            CONTROL_LSB => {
                self.control_lsb[ch] = value;
                self.select_control(ch, READY_CONTROL_LSB);
            }
            VALUE_MSB => {
                self.value_msb[ch] = value;
                self.ready[ch] |= READY_VALUE_MSB;
            }
            VALUE_LSB => {
                self.value_lsb[ch] = value;
                self.ready[ch] |= READY_VALUE_LSB;
                if self.ready[ch] == READY_ALL {
                    let nrpn = Nrpn {
                        control: join(self.control_msb[ch], self.control_lsb[ch]),
                        value: join(self.value_msb[ch], self.value_lsb[ch]),
                    };
                    self.clear(ch);
                    return Ok(Some(nrpn));
                }
            }
            _ => {}
        }
        Ok(None)
    }

    /// Forget any partial sequence on a channel
    pub fn reset(&mut self, channel: u8) -> Result<()> {
        let ch = channel as usize;
        if ch >= CHANNELS {
            return Err(BridgeError::ChannelOutOfRange(channel));
        }
        self.clear(ch);
        Ok(())
    }

    /// A new parameter selection invalidates any in-flight value
    fn select_control(&mut self, ch: usize, flag: u8) {
        self.ready[ch] = (self.ready[ch] & READY_CONTROL) | flag;
        if self.ready[ch] == READY_CONTROL
            && self.control_msb[ch] == NULL_FUNCTION
            && self.control_lsb[ch] == NULL_FUNCTION
        {
            self.clear(ch);
        }
    }

    fn clear(&mut self, ch: usize) {
        self.ready[ch] = 0;
        self.control_msb[ch] = 0;
        self.control_lsb[ch] = 0;
        self.value_msb[ch] = 0;
        self.value_lsb[ch] = 0;
    }
}

fn join(msb: u8, lsb: u8) -> u16 {
    ((msb as u16) << 7) | lsb as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(asm: &mut NrpnAssembler, channel: u8, seq: &[(u8, u8)]) -> Vec<Nrpn> {
        seq.iter()
            .filter_map(|&(cc, v)| asm.process(channel, cc, v).unwrap())
            .collect()
    }

    #[test]
    fn test_full_cycle_emits_once() {
        let mut asm = NrpnAssembler::new();
        let out = feed(
            &mut asm,
            0,
            &[(CONTROL_MSB, 1), (CONTROL_LSB, 2), (VALUE_MSB, 3), (VALUE_LSB, 4)],
        );
        assert_eq!(
            out,
            vec![Nrpn {
                control: (1 << 7) | 2,
                value: (3 << 7) | 4
            }]
        );
    }

    #[test]
    fn test_repeated_value_lsb_does_not_reemit() {
        let mut asm = NrpnAssembler::new();
        let out = feed(
            &mut asm,
            5,
            &[
                (CONTROL_MSB, 0),
                (CONTROL_LSB, 10),
                (VALUE_MSB, 64),
                (VALUE_LSB, 0),
                (VALUE_LSB, 1),
                (VALUE_LSB, 2),
            ],
        );
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_missing_fourth_message_is_discarded() {
        let mut asm = NrpnAssembler::new();
        let out = feed(
            &mut asm,
            0,
            &[
                (CONTROL_MSB, 1),
                (CONTROL_LSB, 2),
                (VALUE_MSB, 3),
                (CONTROL_MSB, 1),
            ],
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_new_selection_invalidates_latched_value() {
        let mut asm = NrpnAssembler::new();
        let out = feed(
            &mut asm,
            0,
            &[
                (CONTROL_MSB, 1),
                (CONTROL_LSB, 2),
                (VALUE_MSB, 3),
                (CONTROL_LSB, 9),
                (VALUE_LSB, 4),
            ],
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_channels_are_independent() {
        let mut asm = NrpnAssembler::new();
        let mut out = Vec::new();
        let steps = [
            (0, CONTROL_MSB, 1),
            (1, CONTROL_MSB, 7),
            (0, CONTROL_LSB, 2),
            (1, CONTROL_LSB, 8),
            (0, VALUE_MSB, 3),
            (1, VALUE_MSB, 9),
            (1, VALUE_LSB, 10),
            (0, VALUE_LSB, 4),
        ];
        for (ch, cc, v) in steps {
            if let Some(n) = asm.process(ch, cc, v).unwrap() {
                out.push((ch, n));
            }
        }
        assert_eq!(
            out,
            vec![
                (
                    1,
                    Nrpn {
                        control: (7 << 7) | 8,
                        value: (9 << 7) | 10
                    }
                ),
                (
                    0,
                    Nrpn {
                        control: (1 << 7) | 2,
                        value: (3 << 7) | 4
                    }
                ),
            ]
        );
    }

    #[test]
    fn test_null_function_clears_channel() {
        let mut asm = NrpnAssembler::new();
        let out = feed(
            &mut asm,
            0,
            &[
                (CONTROL_MSB, 0x7F),
                (CONTROL_LSB, 0x7F),
                (VALUE_MSB, 3),
                (VALUE_LSB, 4),
            ],
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_other_controllers_ignored() {
        let mut asm = NrpnAssembler::new();
        assert_eq!(asm.process(0, 7, 100).unwrap(), None);
        assert!(!is_nrpn_control(7));
        assert!(is_nrpn_control(VALUE_LSB));
    }

    #[test]
    fn test_channel_out_of_range() {
        let mut asm = NrpnAssembler::new();
        assert!(matches!(
            asm.process(16, CONTROL_MSB, 0),
            Err(BridgeError::ChannelOutOfRange(16))
        ));
    }
}
