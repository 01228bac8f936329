//! Dispatcher: decoded MIDI events in, host command lines out
//!
//! For each event the bound command is looked up in the profile. Repeat
//! commands turn the control's movement into one of two fixed lines and pass
//! through a debounce gate; every other command is sent with the control's
//! value scaled to 0-16383.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::commands::is_local_command;
use crate::controls::{CcMethod, ControlsModel};
use crate::host::CommandSink;
use crate::midi::{EventKind, MidiEvent};
use crate::profile::{ControlId, ProfileTable};
use crate::recenter::RecenterSupervisor;

pub struct Dispatcher {
    profile: Arc<ProfileTable>,
    model: Arc<ControlsModel>,
    sink: Arc<dyn CommandSink>,
    recenter: Option<Arc<RecenterSupervisor>>,
    debounce: Duration,
    /// Earliest time the next repeat command may pass
    next_allowed: Mutex<Option<Instant>>,
}

impl Dispatcher {
    pub fn new(
        profile: Arc<ProfileTable>,
        model: Arc<ControlsModel>,
        sink: Arc<dyn CommandSink>,
        debounce: Duration,
    ) -> Self {
        Self {
            profile,
            model,
            sink,
            recenter: None,
            debounce,
            next_allowed: Mutex::new(None),
        }
    }

    /// Recenter controls after repeat commands
    pub fn with_recenter(mut self, recenter: Arc<RecenterSupervisor>) -> Self {
        self.recenter = Some(recenter);
        self
    }

    /// Handle one event now; returns the line sent, if any
    pub fn handle(&self, event: &MidiEvent) -> Option<String> {
        self.handle_at(event, Instant::now())
    }

    /// Handle one event as if it arrived at `now`
    pub fn handle_at(&self, event: &MidiEvent, now: Instant) -> Option<String> {
        let control = ControlId::from(event);
        let command = self.profile.lookup(&control)?;
        if is_local_command(&command) {
            trace!("{} bound to {}, not forwarded", control, command);
            return None;
        }

        let line = match self.profile.catalog().repeat(&command) {
            Some(repeat) => {
                if !self.admit(now) {
                    trace!("Debounced {} from {}", command, control);
                    return None;
                }
                if self.recenters(event) {
                    if let Some(recenter) = &self.recenter {
                        recenter.arm(*event);
                    }
                }
                let change = self.model.measure_change(event).ok()?;
                match change {
                    0 => return None,
                    c if c > 0 => repeat.cw.to_string(),
                    _ => repeat.ccw.to_string(),
                }
            }
            None => {
                let value = self.model.controller_to_command_value(event).ok()?;
                format!("{} {}\n", command, value)
            }
        };

        trace!("{} -> {}", event, line.trim_end());
        self.sink.send_command(line.clone());
        Some(line)
    }

    /// Check and move the debounce watermark in one step
    fn admit(&self, now: Instant) -> bool {
        let mut next = self.next_allowed.lock();
        if matches!(*next, Some(t) if now <= t) {
            return false;
        }
        *next = Some(now + self.debounce);
        true
    }

    fn recenters(&self, event: &MidiEvent) -> bool {
        match event.kind {
            EventKind::PitchBend => true,
            EventKind::ControlChange => {
                matches!(
                    self.model.cc_method(event.channel, event.number),
                    Ok(CcMethod::Absolute)
                )
            }
            EventKind::NoteOn => false,
        }
    }

    /// Drain `events` until every sender is gone
    pub async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<MidiEvent>) {
        debug!("Dispatcher started");
        while let Some(event) = events.recv().await {
            self.handle(&event);
        }
        debug!("Dispatcher stopped");
    }
}
