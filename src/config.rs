//! Recorder configuration
//!
//! Loaded once at startup from a TOML file. Global values act as defaults
//! for every `[[devices]]` entry.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::{Error, Result};

/// Top-level configuration file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Root directory for all device recordings
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,

    /// Delay before redialing a device after a failed attempt
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    /// Frame rate hint handed to the transcoder
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    /// Monitored devices
    #[serde(default)]
    pub devices: Vec<DeviceSection>,
}

/// One `[[devices]]` table as written in the file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceSection {
    pub name: String,
    /// Gateway `host[:port]`
    pub ws_host: String,
    /// Opaque `_paramStr_` token
    pub param_token: String,
    #[serde(default = "default_segment_size")]
    pub segment_size_mb: u64,
    /// Number of day directories kept per device
    #[serde(default = "default_retained_days")]
    pub retained_days: usize,
    pub reconnect_delay_secs: Option<u64>,
    pub frame_rate: Option<u32>,
}

/// Fully resolved per-device settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub name: String,
    pub ws_host: String,
    pub param_token: String,
    pub segment_size_mb: u64,
    pub retained_days: usize,
    pub reconnect_delay_secs: u64,
    pub storage_root: PathBuf,
    pub frame_rate: u32,
}

impl DeviceConfig {
    /// Size at which a capture session is sealed
    pub fn segment_threshold_bytes(&self) -> usize {
        (self.segment_size_mb as usize).saturating_mul(BYTES_PER_MB)
    }

    /// `{storage_root}/{name}`
    pub fn device_dir(&self) -> PathBuf {
        self.storage_root.join(&self.name)
    }
}

fn default_storage_root() -> PathBuf {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.data_dir().join("recordings"))
        .unwrap_or_else(|| PathBuf::from("recordings"))
}

fn default_reconnect_delay() -> u64 {
    DEFAULT_RECONNECT_DELAY_SECS
}

fn default_frame_rate() -> u32 {
    DEFAULT_FRAME_RATE
}

fn default_segment_size() -> u64 {
    DEFAULT_SEGMENT_SIZE_MB
}

fn default_retained_days() -> usize {
    DEFAULT_RETAINED_DAYS
}

impl AppConfig {
    /// Default location of the config file
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("", "", APP_NAME)
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
    }

    /// Read and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    /// Parse and validate TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.devices.is_empty() {
            return Err(Error::Config("no devices configured".into()));
        }
        if self.frame_rate == 0 {
            return Err(Error::Config("frame_rate must be positive".into()));
        }

        let mut seen = HashSet::new();
        for device in &self.devices {
            let name = device.name.as_str();
            if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
                return Err(Error::Config(format!("invalid device name {:?}", name)));
            }
            if !seen.insert(name) {
                return Err(Error::Config(format!("duplicate device name {:?}", name)));
            }
            if device.ws_host.trim().is_empty() {
                return Err(Error::Config(format!("device {}: ws_host is empty", name)));
            }
            if device.param_token.is_empty() {
                return Err(Error::Config(format!("device {}: param_token is empty", name)));
            }
            if device.segment_size_mb == 0 {
                return Err(Error::Config(format!(
                    "device {}: segment_size_mb must be positive",
                    name
                )));
            }
            if device.frame_rate == Some(0) {
                return Err(Error::Config(format!("device {}: frame_rate must be positive", name)));
            }
        }
        Ok(())
    }

    /// Resolve every device against the global defaults
    pub fn device_configs(&self) -> Vec<DeviceConfig> {
        self.devices
            .iter()
            .map(|d| DeviceConfig {
                name: d.name.clone(),
                ws_host: d.ws_host.trim().to_string(),
                param_token: d.param_token.clone(),
                segment_size_mb: d.segment_size_mb,
                retained_days: d.retained_days,
                reconnect_delay_secs: d.reconnect_delay_secs.unwrap_or(self.reconnect_delay_secs),
                storage_root: self.storage_root.clone(),
                frame_rate: d.frame_rate.unwrap_or(self.frame_rate),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        storage_root = "/data/rec"
        reconnect_delay_secs = 12

        [[devices]]
        name = "cam1"
        ws_host = "gw.example.com:50443"
        param_token = "tok1"

        [[devices]]
        name = "cam2"
        ws_host = "gw.example.com:50443"
        param_token = "tok2"
        segment_size_mb = 1
        retained_days = 2
        reconnect_delay_secs = 3
        frame_rate = 15
    "#;

    #[test]
    fn test_defaults_and_overrides() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        let devices = config.device_configs();
        assert_eq!(devices.len(), 2);

        let cam1 = &devices[0];
        assert_eq!(cam1.storage_root, PathBuf::from("/data/rec"));
        assert_eq!(cam1.segment_size_mb, DEFAULT_SEGMENT_SIZE_MB);
        assert_eq!(cam1.retained_days, DEFAULT_RETAINED_DAYS);
        assert_eq!(cam1.reconnect_delay_secs, 12);
        assert_eq!(cam1.frame_rate, DEFAULT_FRAME_RATE);
        assert_eq!(cam1.device_dir(), PathBuf::from("/data/rec/cam1"));

        let cam2 = &devices[1];
        assert_eq!(cam2.segment_threshold_bytes(), 1024 * 1024);
        assert_eq!(cam2.retained_days, 2);
        assert_eq!(cam2.reconnect_delay_secs, 3);
        assert_eq!(cam2.frame_rate, 15);
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let text = r#"
            [[devices]]
            name = "cam"
            ws_host = "a"
            param_token = "t"

            [[devices]]
            name = "cam"
            ws_host = "b"
            param_token = "t"
        "#;
        let err = AppConfig::from_toml(text).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_rejects_path_like_names() {
        for name in ["", "..", "a/b", "a\\b"] {
            let text = format!(
                "[[devices]]\nname = {:?}\nws_host = \"h\"\nparam_token = \"t\"\n",
                name
            );
            assert!(AppConfig::from_toml(&text).is_err(), "accepted {:?}", name);
        }
    }

    #[test]
    fn test_rejects_zero_segment_size() {
        let text = "[[devices]]\nname = \"c\"\nws_host = \"h\"\nparam_token = \"t\"\nsegment_size_mb = 0\n";
        assert!(AppConfig::from_toml(text).is_err());
    }

    #[test]
    fn test_requires_devices() {
        assert!(AppConfig::from_toml("frame_rate = 25").is_err());
    }

    #[test]
    fn test_unknown_field_is_an_error() {
        let text = "[[devices]]\nname = \"c\"\nws_host = \"h\"\nparam_token = \"t\"\nsize = 3\n";
        assert!(matches!(AppConfig::from_toml(text), Err(Error::Config(_))));
    }
}
