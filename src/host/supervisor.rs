//! Connection supervisor
//!
//! While started, a periodic tick either probes the live connection or tries a
//! bounded connect to the host. Transitions happen under one lock together
//! with an epoch counter: `stop()` bumps the epoch, so a connect that
//! finishes after a stop is thrown away instead of being attached.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::link::HostLink;
use super::observer::ObserverList;
use crate::config::HostConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Stopped,
    Polling,
    Connected,
}

struct Status {
    state: ConnectionState,
    epoch: u64,
}

struct Shared {
    status: Mutex<Status>,
    link: Arc<HostLink>,
    observers: Arc<ObserverList>,
    address: String,
    port: u16,
    connect_timeout: Duration,
}

pub struct ConnectionSupervisor {
    shared: Arc<Shared>,
    retry_interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionSupervisor {
    pub fn new(config: &HostConfig, link: Arc<HostLink>, observers: Arc<ObserverList>) -> Self {
        Self {
            shared: Arc::new(Shared {
                status: Mutex::new(Status {
                    state: ConnectionState::Stopped,
                    epoch: 0,
                }),
                link,
                observers,
                address: config.address.clone(),
                port: config.port,
                connect_timeout: config.connect_timeout(),
            }),
            retry_interval: config.retry_interval(),
            task: Mutex::new(None),
        }
    }

    /// Begin polling; no-op if already running. Needs a Tokio runtime.
    pub fn start(&self) {
        let epoch = {
            let mut status = self.shared.status.lock();
            if status.state != ConnectionState::Stopped {
                return;
            }
            status.state = ConnectionState::Polling;
            status.epoch += 1;
            status.epoch
        };

        let shared = self.shared.clone();
        let period = self.retry_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !shared.tick(epoch).await {
                    break;
                }
            }
        });
        if let Some(old) = self.task.lock().replace(handle) {
            old.abort();
        }
        info!(
            "Connection supervisor polling {}:{} every {:?}",
            self.shared.address, self.shared.port, period
        );
    }

    /// Stop polling; idempotent and safe while a connect is in flight
    pub fn stop(&self) {
        {
            let mut status = self.shared.status.lock();
            status.epoch += 1;
            if status.state == ConnectionState::Connected {
                debug!("Supervisor stopped while connected");
            }
            status.state = ConnectionState::Stopped;
        }
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.status.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected && self.shared.link.is_attached()
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

impl Shared {
    /// One timer callback; returns false when this run has been stopped
    async fn tick(&self, epoch: u64) -> bool {
        let state = {
            let status = self.status.lock();
            if status.epoch != epoch || status.state == ConnectionState::Stopped {
                return false;
            }
            status.state
        };

        if state == ConnectionState::Connected {
            if self.link.probe() {
                return true;
            }
            if !self.transition(epoch, ConnectionState::Connected, ConnectionState::Polling) {
                return false;
            }
            self.link.close();
            info!("Disconnected from host");
            self.observers.notify(false);
        }

        self.try_connect(epoch).await;
        true
    }

    async fn try_connect(&self, epoch: u64) {
        let target = (self.address.as_str(), self.port);
        let stream = match time::timeout(self.connect_timeout, TcpStream::connect(target)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                trace!("Connect to {}:{} failed: {}", self.address, self.port, e);
                return;
            }
            Err(_) => {
                trace!("Connect to {}:{} timed out", self.address, self.port);
                return;
            }
        };

        let stream = match stream.into_std() {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to take over host socket: {}", e);
                return;
            }
        };

        {
            let mut status = self.status.lock();
            if status.epoch != epoch || status.state != ConnectionState::Polling {
                debug!("Discarding connection made after stop");
                return;
            }
            if let Err(e) = self.link.attach(stream) {
                warn!("Failed to configure host socket: {}", e);
                return;
            }
            status.state = ConnectionState::Connected;
        }
        info!("Connected to host at {}:{}", self.address, self.port);
        self.observers.notify(true);
    }

    fn transition(&self, epoch: u64, from: ConnectionState, to: ConnectionState) -> bool {
        let mut status = self.status.lock();
        if status.epoch != epoch || status.state != from {
            return false;
        }
        status.state = to;
        true
    }
}
