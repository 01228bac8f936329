//! Recenter supervisor
//!
//! After a repeat-command control goes quiet, snap it back to its neutral
//! position by sending MIDI to the controller. One slot: arming again before
//! the delay expires replaces the stored event and restarts the window.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace, warn};

use crate::controls::ControlsModel;
use crate::midi::device::MidiSink;
use crate::midi::nrpn::{CONTROL_LSB, CONTROL_MSB, VALUE_LSB, VALUE_MSB};
use crate::midi::{EventKind, MidiEvent, MidiMessage, MAX_MIDI};

#[derive(Debug, Clone, Copy)]
enum RecenterState {
    Idle,
    Armed { deadline: Instant, event: MidiEvent },
}

struct Inner {
    state: Mutex<RecenterState>,
    wake: Notify,
    delay: Duration,
    model: Arc<ControlsModel>,
    sink: Arc<dyn MidiSink>,
}

pub struct RecenterSupervisor {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RecenterSupervisor {
    /// Spawn the timer task; needs a Tokio runtime
    pub fn spawn(delay: Duration, model: Arc<ControlsModel>, sink: Arc<dyn MidiSink>) -> Self {
        let inner = Arc::new(Inner {
            state: Mutex::new(RecenterState::Idle),
            wake: Notify::new(),
            delay,
            model,
            sink,
        });
        let task = tokio::spawn(run(inner.clone()));
        debug!("Recenter supervisor started (delay {:?})", delay);
        Self {
            inner,
            task: Mutex::new(Some(task)),
        }
    }

    /// Schedule a recenter of `event`'s control, replacing any pending one
    pub fn arm(&self, event: MidiEvent) {
        *self.inner.state.lock() = RecenterState::Armed {
            deadline: Instant::now() + self.inner.delay,
            event,
        };
        self.inner.wake.notify_one();
    }

    pub fn is_armed(&self) -> bool {
        matches!(*self.inner.state.lock(), RecenterState::Armed { .. })
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// Cancel any pending recenter and stop the task
    pub fn stop(&self) {
        *self.inner.state.lock() = RecenterState::Idle;
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for RecenterSupervisor {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

async fn run(inner: Arc<Inner>) {
    loop {
        let deadline = match *inner.state.lock() {
            RecenterState::Idle => None,
            RecenterState::Armed { deadline, .. } => Some(deadline),
        };
        match deadline {
            None => inner.wake.notified().await,
            Some(deadline) => {
                tokio::select! {
                    _ = sleep_until(deadline) => {
                        if let Some(event) = inner.take_due() {
                            inner.fire(&event);
                        }
                    }
                    _ = inner.wake.notified() => {}
                }
            }
        }
    }
}

impl Inner {
    /// Take the stored event if its deadline has passed
    fn take_due(&self) -> Option<MidiEvent> {
        let mut state = self.state.lock();
        match *state {
            RecenterState::Armed { deadline, event } if deadline <= Instant::now() => {
                *state = RecenterState::Idle;
                Some(event)
            }
            _ => None,
        }
    }

    fn fire(&self, event: &MidiEvent) {
        let center = match self.model.set_to_center(event) {
            Ok(center) => center,
            Err(e) => {
                warn!("Cannot recenter {}: {}", event, e);
                return;
            }
        };
        trace!("Recentering {} to {}", event, center);
        for message in recenter_messages(event, center) {
            if let Err(e) = self.sink.send(&message) {
                warn!("Recenter of {} failed: {}", event, e);
                return;
            }
        }
    }
}

/// MIDI that moves `event`'s control to `center`
fn recenter_messages(event: &MidiEvent, center: u16) -> Vec<MidiMessage> {
    let channel = event.channel;
    match event.kind {
        EventKind::PitchBend => vec![MidiMessage::PitchBend {
            channel,
            value: center,
        }],
        EventKind::ControlChange if event.number <= MAX_MIDI => vec![MidiMessage::ControlChange {
            channel,
            cc: event.number as u8,
            value: (center & 0x7F) as u8,
        }],
        EventKind::ControlChange => {
            let cc = |cc: u8, value: u16| MidiMessage::ControlChange {
                channel,
                cc,
                value: (value & 0x7F) as u8,
            };
            vec![
                cc(CONTROL_MSB, event.number >> 7),
                cc(CONTROL_LSB, event.number),
                cc(VALUE_MSB, center >> 7),
                cc(VALUE_LSB, center),
            ]
        }
        EventKind::NoteOn => Vec::new(),
    }
}
