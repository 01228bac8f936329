//! MIDI Host GW
//!
//! Gateway from a MIDI control surface to a host application that accepts
//! newline-terminated command lines on a loopback TCP port.
//!
//! Data flow: MIDI input callback → [`midi::NrpnAssembler`] → decoded
//! [`midi::MidiEvent`] → [`dispatch::Dispatcher`] (consults the
//! [`profile::ProfileTable`], may arm the [`recenter::RecenterSupervisor`]) →
//! [`host::CommandQueue`] → writer thread → socket.

pub mod commands;
pub mod config;
pub mod controls;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod midi;
pub mod paths;
pub mod profile;
pub mod recenter;
pub mod settings;

pub use error::{BridgeError, Result};
