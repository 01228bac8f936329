//! Application path management for portable and installed modes.
//!
//! - **Portable mode**: a `.portable` marker next to the executable keeps the
//!   config and the profile in that directory.
//! - **Installed mode** (default): data lives under the platform data
//!   directory (`%APPDATA%\MIDI Host GW`, `~/.local/share/MIDI Host GW`).

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Application name used for directories in installed mode
const APP_NAME: &str = "MIDI Host GW";

const CONFIG_FILE: &str = "config.yaml";
const EXAMPLE_CONFIG_FILE: &str = "config.example.yaml";
const PROFILE_FILE: &str = "profile.xml";

/// Application paths for the config file and the default profile
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config: PathBuf,
    pub profile: PathBuf,
    pub is_portable: bool,
}

impl AppPaths {
    /// Paths rooted at one directory
    pub fn in_dir(dir: &Path, is_portable: bool) -> Self {
        Self {
            config: dir.join(CONFIG_FILE),
            profile: dir.join(PROFILE_FILE),
            is_portable,
        }
    }

    /// Detect the appropriate paths based on environment.
    ///
    /// Debug builds prefer a `config.yaml` in the working directory. Called
    /// before logging is initialized, so diagnostics go to stderr.
    pub fn detect() -> Self {
        let exe_dir = exe_dir();

        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            if cwd.join(CONFIG_FILE).exists() {
                eprintln!("[paths] Running in DEV mode ({} found in cwd)", CONFIG_FILE);
                return Self::in_dir(&cwd, true);
            }
        }

        if exe_dir.join(".portable").exists() {
            #[cfg(debug_assertions)]
            eprintln!("[paths] Running in PORTABLE mode (.portable marker found)");
            return Self::in_dir(&exe_dir, true);
        }

        let app_data = dirs::data_dir()
            .unwrap_or_else(|| {
                eprintln!("[paths] WARNING: dirs::data_dir() returned None, falling back to exe dir");
                exe_dir.clone()
            })
            .join(APP_NAME);

        #[cfg(debug_assertions)]
        eprintln!("[paths] Running in INSTALLED mode (data dir: {})", app_data.display());

        Self::in_dir(&app_data, false)
    }

    /// Directory holding the config file
    pub fn base_dir(&self) -> PathBuf {
        self.config
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Create the data directory and seed the config in installed mode
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        for dir in [self.config.parent(), self.profile.parent()].into_iter().flatten() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                debug!("Creating directory: {}", dir.display());
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
        }

        if !self.is_portable && !self.config.exists() {
            self.copy_example_config()?;
        }
        Ok(())
    }

    /// Copy `config.example.yaml` from next to the executable or the cwd
    fn copy_example_config(&self) -> anyhow::Result<()> {
        let candidates = [
            exe_dir().join(EXAMPLE_CONFIG_FILE),
            PathBuf::from(EXAMPLE_CONFIG_FILE),
        ];
        if let Some(example) = candidates.iter().find(|p| p.exists()) {
            info!("Copying example config to {}", self.config.display());
            std::fs::copy(example, &self.config).with_context(|| {
                format!(
                    "Failed to copy example config from {} to {}",
                    example.display(),
                    self.config.display()
                )
            })?;
            return Ok(());
        }

        info!("No config found, built-in defaults apply ({})", self.config.display());
        Ok(())
    }
}

fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}
