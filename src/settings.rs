//! Session settings pushed to the host on connect
//!
//! When the host connects (and sending is not paused) it is told whether
//! pickup mode is on and receives a short block of application info.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;
use tracing::info;

use crate::host::{CommandSink, ConnectionObserver};

pub struct SessionSettings {
    sink: Weak<dyn CommandSink>,
    pickup_enabled: AtomicBool,
    app_info: Vec<String>,
}

impl SessionSettings {
    /// `sink` is weak: the host link owns its observers
    pub fn new(sink: Weak<dyn CommandSink>, pickup_enabled: bool, app_info: Vec<String>) -> Self {
        Self {
            sink,
            pickup_enabled: AtomicBool::new(pickup_enabled),
            app_info,
        }
    }

    pub fn pickup_enabled(&self) -> bool {
        self.pickup_enabled.load(Ordering::Acquire)
    }

    /// Change pickup mode and tell the host right away
    pub fn set_pickup_enabled(&self, enabled: bool) {
        self.pickup_enabled.store(enabled, Ordering::Release);
        if let Some(sink) = self.sink.upgrade() {
            sink.send_command(pickup_line(enabled));
        }
    }
}

fn pickup_line(enabled: bool) -> String {
    format!("Pickup {}\n", if enabled { 1 } else { 0 })
}

impl ConnectionObserver for SessionSettings {
    fn on_connection_changed(&self, connected: bool, sending_stopped: bool) {
        if !connected || sending_stopped {
            return;
        }
        let Some(sink) = self.sink.upgrade() else {
            return;
        };
        let pickup = self.pickup_enabled();
        sink.send_command(pickup_line(pickup));
        info!("Pickup is {}", if pickup { "enabled" } else { "disabled" });

        sink.send_command("AppInfoClear 1\n".to_string());
        for line in &self.app_info {
            sink.send_command(format!("AppInfo {}\n", line));
        }
        sink.send_command("AppInfoDone 1\n".to_string());
    }
}

/// Lines describing this gateway for the host's log
pub fn default_app_info(profile: &std::path::Path) -> Vec<String> {
    vec![
        format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
        format!("Profile {}", profile.display()),
    ]
}
