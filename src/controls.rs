//! Controller value model
//!
//! Tracks, per channel and controller, how a physical control reports movement
//! (absolute position or one of three relative encodings) and the last known
//! position. The dispatcher asks it for deltas and command values; the
//! recenter supervisor asks it for the neutral position.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI32, Ordering};

use crate::error::{BridgeError, Result};
use crate::midi::{EventKind, MidiEvent, CHANNELS, MAX_MIDI, MAX_NRPN};

const MAX_MIDI_I: i32 = MAX_MIDI as i32;
const MAX_NRPN_I: i32 = MAX_NRPN as i32;
const BIT7: i32 = 0x40;
const BIT14: i32 = 0x2000;
const LOW6_BITS: i32 = 0x3F;
const LOW13_BITS: i32 = 0x1FFF;

/// How a control-change reports movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CcMethod {
    /// Value is the position
    #[default]
    Absolute,
    /// Value minus center is the step
    BinaryOffset,
    /// High bit is the sign, remaining bits the step
    SignMagnitude,
    /// Step in two's complement
    TwosComplement,
}

/// NRPN parameters live above the 7-bit controller range
fn is_nrpn(number: usize) -> bool {
    number > MAX_MIDI as usize
}

fn center(low: i32, high: i32) -> i32 {
    // round up so a centered LED ring lights its middle segment
    (high - low) / 2 + low + (high - low) % 2
}

struct ChannelModel {
    cc_method: Vec<CcMethod>,
    cc_low: Vec<i32>,
    cc_high: Vec<i32>,
    current_v: Mutex<Vec<i32>>,
    pitch_wheel_min: i32,
    pitch_wheel_max: i32,
    pitch_wheel_current: AtomicI32,
}

impl ChannelModel {
    fn new() -> Self {
        let size = MAX_NRPN as usize + 1;
        let mut model = Self {
            cc_method: vec![CcMethod::Absolute; size],
            cc_low: vec![0; size],
            cc_high: vec![MAX_NRPN_I; size],
            current_v: Mutex::new(vec![0; size]),
            pitch_wheel_min: 0,
            pitch_wheel_max: MAX_NRPN_I,
            pitch_wheel_current: AtomicI32::new(center(0, MAX_NRPN_I)),
        };
        for high in model.cc_high.iter_mut().take(MAX_MIDI as usize + 1) {
            *high = MAX_MIDI_I;
        }
        let current: Vec<i32> = (0..size)
            .map(|n| center(model.cc_low[n], model.cc_high[n]))
            .collect();
        *model.current_v.get_mut() = current;
        model
    }

    fn center_cc(&self, number: usize) -> i32 {
        center(self.cc_low[number], self.cc_high[number])
    }

    fn center_pw(&self) -> i32 {
        center(self.pitch_wheel_min, self.pitch_wheel_max)
    }

    /// Method first, then range: the range rules depend on the method
    fn set_cc(&mut self, number: usize, low: i32, high: i32, method: CcMethod) {
        self.cc_method[number] = method;
        self.set_cc_min(number, low);
        self.set_cc_max(number, high);
    }

    fn set_cc_min(&mut self, number: usize, value: i32) {
        self.cc_low[number] = if self.cc_method[number] != CcMethod::Absolute
            || value < 0
            || value >= self.cc_high[number]
        {
            0
        } else {
            value
        };
        let c = self.center_cc(number);
        self.current_v.get_mut()[number] = c;
    }

    fn set_cc_max(&mut self, number: usize, value: i32) {
        let max = if is_nrpn(number) { MAX_NRPN_I } else { MAX_MIDI_I };
        self.cc_high[number] = if self.cc_method[number] != CcMethod::Absolute {
            value.clamp(1, MAX_NRPN_I)
        } else if value <= self.cc_low[number] || value > max {
            max
        } else {
            value
        };
        let c = self.center_cc(number);
        self.current_v.get_mut()[number] = c;
    }

    fn set_pitch_wheel_range(&mut self, min: i32, max: i32) {
        self.pitch_wheel_max = if max > MAX_NRPN_I || max <= 0 { MAX_NRPN_I } else { max };
        self.pitch_wheel_min = if min < 0 || min >= self.pitch_wheel_max { 0 } else { min };
        self.pitch_wheel_current
            .store(self.center_pw(), Ordering::Relaxed);
    }

    /// Signed step encoded by a relative controller value
    fn relative_step(&self, number: usize, value: i32) -> i32 {
        let nrpn = is_nrpn(number);
        match self.cc_method[number] {
            CcMethod::Absolute => 0,
            CcMethod::BinaryOffset => value - if nrpn { BIT14 } else { BIT7 },
            CcMethod::SignMagnitude => {
                if nrpn {
                    if value & BIT14 != 0 { -(value & LOW13_BITS) } else { value }
                } else if value & BIT7 != 0 {
                    -(value & LOW6_BITS)
                } else {
                    value
                }
            }
            CcMethod::TwosComplement => {
                if nrpn {
                    if value & BIT14 != 0 { -((value ^ MAX_NRPN_I) + 1) } else { value }
                } else if value & BIT7 != 0 {
                    -((value ^ MAX_MIDI_I) + 1)
                } else {
                    value
                }
            }
        }
    }

    fn measure_change(&self, kind: EventKind, number: usize, value: i32) -> i32 {
        match kind {
            EventKind::PitchBend => value - self.pitch_wheel_current.swap(value, Ordering::AcqRel),
            EventKind::ControlChange => match self.cc_method[number] {
                CcMethod::Absolute => {
                    let mut current = self.current_v.lock();
                    let diff = value - current[number];
                    current[number] = value;
                    diff
                }
                _ => self.relative_step(number, value),
            },
            EventKind::NoteOn => 0,
        }
    }

    /// Position as a fraction of the control's range
    fn controller_to_fraction(&self, kind: EventKind, number: usize, value: i32) -> f64 {
        let fraction = match kind {
            EventKind::PitchBend => {
                self.pitch_wheel_current.store(value, Ordering::Release);
                (value - self.pitch_wheel_min) as f64
                    / (self.pitch_wheel_max - self.pitch_wheel_min) as f64
            }
            EventKind::ControlChange => match self.cc_method[number] {
                CcMethod::Absolute => {
                    self.current_v.lock()[number] = value;
                    (value - self.cc_low[number]) as f64
                        / (self.cc_high[number] - self.cc_low[number]) as f64
                }
                _ => {
                    let step = self.relative_step(number, value);
                    let high = self.cc_high[number];
                    let mut current = self.current_v.lock();
                    current[number] = (current[number] + step).clamp(0, high);
                    current[number] as f64 / high as f64
                }
            },
            EventKind::NoteOn => {
                let max = if is_nrpn(number) { MAX_NRPN_I } else { MAX_MIDI_I };
                value as f64 / max as f64
            }
        };
        fraction.clamp(0.0, 1.0)
    }

    fn set_to_center(&self, kind: EventKind, number: usize) -> i32 {
        match kind {
            EventKind::PitchBend => {
                let c = self.center_pw();
                self.pitch_wheel_current.store(c, Ordering::Release);
                c
            }
            EventKind::ControlChange if self.cc_method[number] == CcMethod::Absolute => {
                let c = self.center_cc(number);
                self.current_v.lock()[number] = c;
                c
            }
            _ => 0,
        }
    }
}

/// Value model for all 16 channels
pub struct ControlsModel {
    channels: Vec<ChannelModel>,
}

impl ControlsModel {
    /// All controls absolute, full range
    pub fn new() -> Self {
        Self {
            channels: (0..CHANNELS).map(|_| ChannelModel::new()).collect(),
        }
    }

    fn channel(&self, channel: u8) -> Result<&ChannelModel> {
        self.channels
            .get(channel as usize)
            .ok_or(BridgeError::ChannelOutOfRange(channel))
    }

    fn channel_mut(&mut self, channel: u8) -> Result<&mut ChannelModel> {
        self.channels
            .get_mut(channel as usize)
            .ok_or(BridgeError::ChannelOutOfRange(channel))
    }

    fn number(number: u16) -> usize {
        number.min(MAX_NRPN) as usize
    }

    /// Configure one controller; channel is 0-15
    pub fn set_cc(
        &mut self,
        channel: u8,
        number: u16,
        low: u16,
        high: u16,
        method: CcMethod,
    ) -> Result<()> {
        let n = Self::number(number);
        self.channel_mut(channel)?
            .set_cc(n, low as i32, high as i32, method);
        Ok(())
    }

    /// Configure a channel's pitch wheel range
    pub fn set_pitch_wheel_range(&mut self, channel: u8, min: u16, max: u16) -> Result<()> {
        self.channel_mut(channel)?
            .set_pitch_wheel_range(min as i32, max as i32);
        Ok(())
    }

    pub fn cc_method(&self, channel: u8, number: u16) -> Result<CcMethod> {
        Ok(self.channel(channel)?.cc_method[Self::number(number)])
    }

    /// Signed movement since the last reading of this control
    pub fn measure_change(&self, event: &MidiEvent) -> Result<i32> {
        Ok(self.channel(event.channel)?.measure_change(
            event.kind,
            Self::number(event.number),
            event.value as i32,
        ))
    }

    /// Absolute value to send to the host, scaled to 0-16383
    pub fn controller_to_command_value(&self, event: &MidiEvent) -> Result<i32> {
        let fraction = self.channel(event.channel)?.controller_to_fraction(
            event.kind,
            Self::number(event.number),
            event.value as i32,
        );
        Ok((fraction * MAX_NRPN as f64).round() as i32)
    }

    /// Neutral position for the control, recorded as its current value
    pub fn set_to_center(&self, event: &MidiEvent) -> Result<u16> {
        Ok(self
            .channel(event.channel)?
            .set_to_center(event.kind, Self::number(event.number)) as u16)
    }
}

impl Default for ControlsModel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_cc_measures_difference() {
        let model = ControlsModel::new();
        // default current value is the center, 64
        assert_eq!(model.measure_change(&MidiEvent::control_change(0, 7, 65)).unwrap(), 1);
        assert_eq!(model.measure_change(&MidiEvent::control_change(0, 7, 64)).unwrap(), -1);
        assert_eq!(model.measure_change(&MidiEvent::control_change(0, 7, 64)).unwrap(), 0);
    }

    #[test]
    fn test_relative_encodings() {
        let mut model = ControlsModel::new();
        model.set_cc(0, 1, 0, 127, CcMethod::BinaryOffset).unwrap();
        model.set_cc(0, 2, 0, 127, CcMethod::SignMagnitude).unwrap();
        model.set_cc(0, 3, 0, 127, CcMethod::TwosComplement).unwrap();

        assert_eq!(model.measure_change(&MidiEvent::control_change(0, 1, 65)).unwrap(), 1);
        assert_eq!(model.measure_change(&MidiEvent::control_change(0, 1, 62)).unwrap(), -2);
        assert_eq!(model.measure_change(&MidiEvent::control_change(0, 2, 0x41)).unwrap(), -1);
        assert_eq!(model.measure_change(&MidiEvent::control_change(0, 2, 3)).unwrap(), 3);
        assert_eq!(model.measure_change(&MidiEvent::control_change(0, 3, 127)).unwrap(), -1);
        assert_eq!(model.measure_change(&MidiEvent::control_change(0, 3, 2)).unwrap(), 2);
    }

    #[test]
    fn test_pitch_bend_change_and_center() {
        let model = ControlsModel::new();
        let ev = MidiEvent::pitch_bend(2, 8200);
        assert_eq!(model.measure_change(&ev).unwrap(), 8);
        assert_eq!(model.set_to_center(&ev).unwrap(), 8192);
        assert_eq!(model.measure_change(&MidiEvent::pitch_bend(2, 8190)).unwrap(), -2);
    }

    #[test]
    fn test_command_values_scale_to_14_bits() {
        let model = ControlsModel::new();
        assert_eq!(
            model.controller_to_command_value(&MidiEvent::control_change(0, 10, 127)).unwrap(),
            16383
        );
        assert_eq!(
            model.controller_to_command_value(&MidiEvent::control_change(0, 10, 0)).unwrap(),
            0
        );
        assert_eq!(
            model.controller_to_command_value(&MidiEvent::note_on(0, 36, 127)).unwrap(),
            16383
        );
        assert_eq!(
            model.controller_to_command_value(&MidiEvent::pitch_bend(0, 16383)).unwrap(),
            16383
        );
    }

    #[test]
    fn test_relative_command_value_accumulates_and_clamps() {
        let mut model = ControlsModel::new();
        model.set_cc(1, 20, 0, 100, CcMethod::BinaryOffset).unwrap();
        // current starts at center 50; +50 reaches the top
        let up = MidiEvent::control_change(1, 20, 64 + 50);
        assert_eq!(model.controller_to_command_value(&up).unwrap(), 16383);
        assert_eq!(model.controller_to_command_value(&up).unwrap(), 16383);
        let down = MidiEvent::control_change(1, 20, 64 - 60);
        assert_eq!(model.controller_to_command_value(&down).unwrap(), 6553);
    }

    #[test]
    fn test_absolute_range_limits() {
        let mut model = ControlsModel::new();
        model.set_cc(0, 5, 20, 200, CcMethod::Absolute).unwrap();
        // high above 7-bit max falls back to 127
        assert_eq!(model.set_to_center(&MidiEvent::control_change(0, 5, 0)).unwrap(), 74);
        assert_eq!(model.cc_method(0, 5).unwrap(), CcMethod::Absolute);
    }

    #[test]
    fn test_relative_control_has_no_center() {
        let mut model = ControlsModel::new();
        model.set_cc(0, 5, 0, 127, CcMethod::TwosComplement).unwrap();
        assert_eq!(model.set_to_center(&MidiEvent::control_change(0, 5, 1)).unwrap(), 0);
    }

    #[test]
    fn test_channel_out_of_range_is_rejected() {
        let mut model = ControlsModel::new();
        assert!(matches!(
            model.set_cc(16, 7, 0, 127, CcMethod::BinaryOffset),
            Err(BridgeError::ChannelOutOfRange(16))
        ));
        assert!(model.set_pitch_wheel_range(20, 0, 100).is_err());
        // channel 4 keeps its defaults instead of picking up channel 20
        assert_eq!(model.cc_method(4, 7).unwrap(), CcMethod::Absolute);
        assert!(model
            .measure_change(&MidiEvent::control_change(20, 7, 65))
            .is_err());
        assert!(model.set_to_center(&MidiEvent::pitch_bend(16, 0)).is_err());
    }
}
