//! Outbound link to the host application
//!
//! [`HostOut`] ties together the command queue, the writer thread that owns
//! the socket writes, and the connection supervisor. Commands are plain text
//! lines (`"<Command> <value>\n"`); nothing is read back from the host.
//!
//! Delivery is at most once. Lines popped while disconnected are dropped, and
//! lines still queued at shutdown are counted and discarded.

pub mod link;
pub mod observer;
pub mod queue;
pub mod supervisor;
pub mod writer;

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info};

use crate::commands::FULL_REFRESH;
use crate::config::HostConfig;
use crate::error::{BridgeError, Result};

pub use link::HostLink;
pub use observer::{ConnectionObserver, ObserverList};
pub use queue::{CommandQueue, PendingCommand};
pub use supervisor::{ConnectionState, ConnectionSupervisor};

/// Anything that accepts host command lines
pub trait CommandSink: Send + Sync {
    fn send_command(&self, line: String);
}

pub struct HostOut {
    queue: Arc<CommandQueue>,
    link: Arc<HostLink>,
    observers: Arc<ObserverList>,
    supervisor: ConnectionSupervisor,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl HostOut {
    pub fn new(config: &HostConfig) -> Self {
        let link = Arc::new(HostLink::new());
        let observers = Arc::new(ObserverList::new());
        let supervisor = ConnectionSupervisor::new(config, link.clone(), observers.clone());
        Self {
            queue: Arc::new(CommandQueue::new()),
            link,
            observers,
            supervisor,
            writer: Mutex::new(None),
        }
    }

    /// Spawn the writer thread and begin connecting; needs a Tokio runtime
    pub fn start(&self) -> std::io::Result<()> {
        {
            let mut slot = self.writer.lock();
            if slot.is_none() {
                *slot = Some(writer::spawn(self.queue.clone(), self.link.clone())?);
            }
        }
        self.supervisor.start();
        Ok(())
    }

    pub fn add_observer(&self, observer: Arc<dyn ConnectionObserver>) {
        self.observers.add(observer);
    }

    pub fn is_connected(&self) -> bool {
        self.supervisor.is_connected()
    }

    pub fn is_sending_stopped(&self) -> bool {
        self.observers.sending_stopped()
    }

    /// Pause sending; commands are refused until [`restart_sending`](Self::restart_sending)
    pub fn stop_sending(&self) {
        self.observers.set_sending_stopped(true);
        self.observers.notify(self.is_connected());
        info!("Sending to host paused");
    }

    /// Resume sending and ask the host to resync every control
    pub fn restart_sending(&self) {
        self.observers.set_sending_stopped(false);
        self.observers.notify(self.is_connected());
        self.send_command(FULL_REFRESH.to_string());
        info!("Sending to host resumed");
    }

    /// Orderly teardown
    ///
    /// Refuses new commands, discards what is queued, joins the writer, stops
    /// the supervisor and closes the socket, in that order.
    pub fn shutdown(&self) -> Result<()> {
        let discarded = self.queue.terminate();
        if discarded > 0 {
            info!("{} commands left in queue at shutdown", discarded);
        }

        let writer = self.writer.lock().take();
        if let Some(handle) = writer {
            handle.join().map_err(|_| BridgeError::WriterJoin)?;
        }

        self.supervisor.stop();
        self.link.close();
        debug!("Host link shut down");
        Ok(())
    }
}

impl CommandSink for HostOut {
    fn send_command(&self, line: String) {
        if self.observers.sending_stopped() {
            return;
        }
        self.queue.push(line);
    }
}
