//! Connection state subscribers

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Told about every connect, disconnect, stop and restart
pub trait ConnectionObserver: Send + Sync {
    fn on_connection_changed(&self, connected: bool, sending_stopped: bool);
}

/// Registered observers plus the administrative stop flag they are told about
#[derive(Default)]
pub struct ObserverList {
    observers: RwLock<Vec<Arc<dyn ConnectionObserver>>>,
    sending_stopped: AtomicBool,
}

impl ObserverList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, observer: Arc<dyn ConnectionObserver>) {
        self.observers.write().push(observer);
    }

    pub fn sending_stopped(&self) -> bool {
        self.sending_stopped.load(Ordering::Acquire)
    }

    pub fn set_sending_stopped(&self, stopped: bool) {
        self.sending_stopped.store(stopped, Ordering::Release);
    }

    /// Notify everyone with the current stop flag
    pub fn notify(&self, connected: bool) {
        let stopped = self.sending_stopped();
        // snapshot so observers may register others from the callback
        let observers: Vec<_> = self.observers.read().clone();
        for observer in observers {
            observer.on_connection_changed(connected, stopped);
        }
    }
}
