//! Profile file watcher for hot-reload support

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Delay before reading a modified file, so the writer can finish
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Watches a profile file and yields its new contents after each modification
pub struct ProfileWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<String>,
}

impl ProfileWatcher {
    /// Start watching `path`; must be called inside a Tokio runtime
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let (tx, rx) = mpsc::channel(10);

        // notify callbacks run on their own OS thread, outside Tokio
        let runtime_handle = tokio::runtime::Handle::current();
        let read_path = path.clone();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Modify(_)) {
                        debug!("Profile file modified: {:?}", event.paths);
                        let path = read_path.clone();
                        let tx = tx.clone();
                        runtime_handle.spawn(async move {
                            tokio::time::sleep(SETTLE_DELAY).await;
                            match tokio::fs::read_to_string(&path).await {
                                Ok(document) => {
                                    // Receiver gone means the gateway is shutting down
                                    let _ = tx.send(document).await;
                                }
                                Err(e) => error!("Failed to read {}: {}", path.display(), e),
                            }
                        });
                    }
                }
                Err(e) => {
                    error!("Watch error: {}", e);
                }
            }
        })?;

        watcher
            .watch(Path::new(&path), RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch profile file: {}", path.display()))?;

        info!("Profile watcher started for: {}", path.display());

        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Wait for the next modified document
    ///
    /// Returns None if the watcher has been closed.
    pub async fn next_document(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}
