//! Configuration management for MIDI Host GW
//!
//! Handles loading, parsing, and validation of the YAML configuration file.
//! Every section has defaults, so an empty file is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::controls::{CcMethod, ControlsModel};
use crate::midi::{CHANNELS, MAX_MIDI, MAX_NRPN};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub host: HostConfig,
    pub midi: MidiConfig,
    pub profile: ProfileConfig,
    pub dispatch: DispatchConfig,
    pub controls: ControlsConfig,
    /// Ask the host to use soft takeover for absolute controls
    #[serde(default = "default_true")]
    pub pickup_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: HostConfig::default(),
            midi: MidiConfig::default(),
            profile: ProfileConfig::default(),
            dispatch: DispatchConfig::default(),
            controls: ControlsConfig::default(),
            pickup_enabled: default_true(),
        }
    }
}

/// Loopback link to the host application
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HostConfig {
    pub address: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub retry_interval_ms: u64,
}

impl HostConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            address: default_host_address(),
            port: default_host_port(),
            connect_timeout_ms: default_connect_timeout_ms(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

/// MIDI port selection (case-insensitive substrings)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MidiConfig {
    /// Input ports to open; empty opens every input
    pub inputs: Vec<String>,
    /// Output port used to recenter controls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Profile file location and persistence
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Overrides the profile in the data directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub save_on_exit: bool,
    pub watch: bool,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            path: None,
            save_on_exit: true,
            watch: true,
        }
    }
}

/// Timing for repeat commands and recentering
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Window in which only the first repeat command passes
    pub debounce_ms: u64,
    /// Floor for the recenter delay
    pub min_recenter_ms: u64,
}

impl DispatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// One and a half debounce windows, never below the floor
    pub fn recenter_delay(&self) -> Duration {
        let derived = self.debounce_ms + self.debounce_ms / 2;
        Duration::from_millis(derived.max(self.min_recenter_ms))
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            min_recenter_ms: default_min_recenter_ms(),
        }
    }
}

/// Per-control behavior
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlsConfig {
    pub cc: Vec<CcSetting>,
    pub pitch_bend: Vec<PitchBendSetting>,
}

/// How one control change (or NRPN parameter) reports movement
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CcSetting {
    /// MIDI channel (1-16)
    pub channel: u8,
    /// Controller number; above 127 is an NRPN parameter
    pub number: u16,
    #[serde(default)]
    pub method: CcMethod,
    #[serde(default)]
    pub low: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<u16>,
}

/// Pitch wheel range for one channel
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PitchBendSetting {
    /// MIDI channel (1-16)
    pub channel: u8,
    #[serde(default)]
    pub min: u16,
    #[serde(default = "default_pitch_bend_max")]
    pub max: u16,
}

impl ControlsConfig {
    /// Build the value model from these settings
    ///
    /// Channels here are 1-16; anything else fails with
    /// [`BridgeError::ChannelOutOfRange`](crate::BridgeError::ChannelOutOfRange).
    pub fn build_model(&self) -> crate::Result<ControlsModel> {
        let mut model = ControlsModel::new();
        for cc in &self.cc {
            let default_high = if cc.number > MAX_MIDI { MAX_NRPN } else { MAX_MIDI };
            model.set_cc(
                cc.channel.saturating_sub(1),
                cc.number,
                cc.low,
                cc.high.unwrap_or(default_high),
                cc.method,
            )?;
        }
        for pb in &self.pitch_bend {
            model.set_pitch_wheel_range(pb.channel.saturating_sub(1), pb.min, pb.max)?;
        }
        Ok(model)
    }
}

impl AppConfig {
    /// Load and validate configuration from a YAML file
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load `path` if it exists, otherwise use defaults
    pub async fn load_or_default(path: &Path) -> Result<Self> {
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub async fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.host.address.is_empty() {
            anyhow::bail!("host address cannot be empty");
        }
        if self.host.port == 0 {
            anyhow::bail!("host port cannot be 0");
        }
        if self.host.connect_timeout_ms == 0 || self.host.retry_interval_ms == 0 {
            anyhow::bail!("host connect_timeout_ms and retry_interval_ms must be positive");
        }
        if self.dispatch.debounce_ms == 0 {
            anyhow::bail!("dispatch debounce_ms must be positive");
        }

        for (idx, cc) in self.controls.cc.iter().enumerate() {
            validate_channel(cc.channel).with_context(|| format!("Invalid cc entry {}", idx))?;
            if cc.number > MAX_NRPN {
                anyhow::bail!("cc entry {}: number {} exceeds {}", idx, cc.number, MAX_NRPN);
            }
            if cc.method == CcMethod::Absolute {
                if let Some(high) = cc.high {
                    if high <= cc.low {
                        anyhow::bail!("cc entry {}: high ({}) must exceed low ({})", idx, high, cc.low);
                    }
                }
            }
        }

        for (idx, pb) in self.controls.pitch_bend.iter().enumerate() {
            validate_channel(pb.channel)
                .with_context(|| format!("Invalid pitch_bend entry {}", idx))?;
            if pb.max > MAX_NRPN || pb.min >= pb.max {
                anyhow::bail!(
                    "pitch_bend entry {}: range {}..{} must satisfy min < max <= {}",
                    idx,
                    pb.min,
                    pb.max,
                    MAX_NRPN
                );
            }
        }

        Ok(())
    }
}

fn validate_channel(channel: u8) -> Result<()> {
    if channel == 0 || channel as usize > CHANNELS {
        anyhow::bail!("channel {} out of range (must be 1-16)", channel);
    }
    Ok(())
}

// Default value functions
fn default_host_address() -> String { "127.0.0.1".to_string() }
fn default_host_port() -> u16 { 58763 }
fn default_connect_timeout_ms() -> u64 { 100 }
fn default_retry_interval_ms() -> u64 { 1000 }
fn default_debounce_ms() -> u64 { 8 }
fn default_min_recenter_ms() -> u64 { 250 }
fn default_pitch_bend_max() -> u16 { MAX_NRPN }
fn default_true() -> bool { true }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::MidiEvent;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.host.address, "127.0.0.1");
        assert_eq!(config.host.port, 58763);
        assert_eq!(config.host.connect_timeout(), Duration::from_millis(100));
        assert_eq!(config.host.retry_interval(), Duration::from_millis(1000));
        assert_eq!(config.dispatch.debounce(), Duration::from_millis(8));
        assert!(config.pickup_enabled);
        assert!(config.profile.save_on_exit);
        config.validate().unwrap();
    }

    #[test]
    fn test_recenter_delay_has_floor() {
        let dispatch = DispatchConfig::default();
        assert_eq!(dispatch.recenter_delay(), Duration::from_millis(250));

        let slow = DispatchConfig {
            debounce_ms: 400,
            min_recenter_ms: 250,
        };
        assert_eq!(slow.recenter_delay(), Duration::from_millis(600));
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
host:
  port: 50000
midi:
  inputs: ["X-TOUCH MINI"]
  output: "X-TOUCH MINI"
profile:
  path: /tmp/develop.xml
  save_on_exit: false
dispatch:
  debounce_ms: 10
controls:
  cc:
    - channel: 1
      number: 16
      method: twos_complement
    - channel: 2
      number: 300
      low: 100
      high: 9000
  pitch_bend:
    - channel: 1
      max: 16000
pickup_enabled: false
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.host.port, 50000);
        assert_eq!(config.host.address, "127.0.0.1");
        assert_eq!(config.midi.inputs, vec!["X-TOUCH MINI"]);
        assert_eq!(config.profile.path, Some(PathBuf::from("/tmp/develop.xml")));
        assert!(!config.pickup_enabled);
        assert_eq!(config.controls.cc[0].method, CcMethod::TwosComplement);

        let model = config.controls.build_model().unwrap();
        assert_eq!(model.cc_method(0, 16).unwrap(), CcMethod::TwosComplement);
        assert_eq!(model.cc_method(1, 300).unwrap(), CcMethod::Absolute);
        assert_eq!(model.set_to_center(&MidiEvent::pitch_bend(0, 0)).unwrap(), 8000);
    }

    #[test]
    fn test_validate_rejects_bad_channel() {
        let mut config = AppConfig::default();
        config.controls.cc.push(CcSetting {
            channel: 17,
            number: 1,
            method: CcMethod::Absolute,
            low: 0,
            high: None,
        });
        assert!(config.validate().is_err());
        // the unvalidated path refuses it too
        assert!(matches!(
            config.controls.build_model(),
            Err(crate::BridgeError::ChannelOutOfRange(16))
        ));
    }

    #[test]
    fn test_validate_rejects_inverted_pitch_range() {
        let mut config = AppConfig::default();
        config.controls.pitch_bend.push(PitchBendSetting {
            channel: 1,
            min: 9000,
            max: 100,
        });
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(&dir.path().join("none.yaml"))
            .await
            .unwrap();
        assert_eq!(config.host.port, 58763);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut config = AppConfig::default();
        config.midi.inputs.push("Launch Control".into());
        config.save(&path).await.unwrap();

        let loaded = AppConfig::load(&path).await.unwrap();
        assert_eq!(loaded.midi.inputs, vec!["Launch Control"]);
    }
}
