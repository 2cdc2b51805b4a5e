// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration module.
//!
//! Handles loading and saving application settings.

use anyhow::Result;
use bluer::Address;
use gethostname::gethostname;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

const APP_DIR: &str = "pbap-server";

/// Get a sanitized hostname suitable for Bluetooth device name.
/// Bluetooth names should only contain alphanumeric chars, spaces, and hyphens.
fn get_sanitized_hostname() -> String {
    let hostname = gethostname().to_string_lossy().to_string();
    let sanitized: String = hostname
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == ' ' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = sanitized.trim_matches('-');
    if trimmed.is_empty() {
        "Phonebook".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for the phonebook database and version counters.
    #[serde(skip)]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub bluetooth: BluetoothConfig,

    #[serde(default)]
    pub phonebook: PhonebookConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Device name advertised over Bluetooth.
    /// This is always computed at runtime from the system hostname.
    #[serde(skip)]
    pub device_name: String,

    /// RFCOMM channel the PBAP server listens on.
    pub rfcomm_channel: u8,

    /// Authorize every connecting peer without asking.
    pub auto_accept: bool,

    /// Peer addresses that are always authorized.
    pub trusted_devices: Vec<String>,

    /// Seconds to wait for a consent decision.
    pub permission_timeout_secs: u64,

    /// Session key answered to OBEX authentication challenges.
    pub obex_session_key: Option<String>,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            device_name: get_sanitized_hostname(),
            rfcomm_channel: 19,
            auto_accept: false,
            trusted_devices: Vec::new(),
            permission_timeout_secs: 30,
            obex_session_key: None,
        }
    }
}

impl BluetoothConfig {
    pub fn permission_timeout(&self) -> Duration {
        Duration::from_secs(self.permission_timeout_secs)
    }

    /// Parsed `trusted_devices`; malformed entries are skipped.
    pub fn trusted_addresses(&self) -> Vec<Address> {
        self.trusted_devices
            .iter()
            .filter_map(|s| match s.parse::<Address>() {
                Ok(addr) => Some(addr),
                Err(e) => {
                    warn!("Ignoring trusted device '{}': {}", s, e);
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PhonebookConfig {
    /// Name on the owner vCard. Defaults to the device name.
    pub owner_name: Option<String>,

    /// Number on the owner vCard.
    pub owner_number: String,

    /// Embed contact photos in pulled vCards.
    pub include_photos: bool,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("config.toml")
}

impl Config {
    /// Load configuration from file or create default.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&config_path())?;
        config.data_dir = default_data_dir();
        std::fs::create_dir_all(&config.data_dir)?;
        Ok(config)
    }

    /// Load configuration from `path`, writing defaults there if missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut config: Config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            let config = Self::default();
            let content = toml::to_string_pretty(&config)?;
            std::fs::write(path, content)?;
            config
        };

        config.bluetooth.device_name = get_sanitized_hostname();
        Ok(config)
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Name on the owner vCard.
    pub fn owner_name(&self) -> String {
        self.phonebook
            .owner_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| self.bluetooth.device_name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.bluetooth.rfcomm_channel, 19);
        assert!(!config.bluetooth.auto_accept);
        assert_eq!(config.bluetooth.permission_timeout(), Duration::from_secs(30));
        assert!(!config.phonebook.include_photos);
        assert!(!config.bluetooth.device_name.is_empty());
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.bluetooth.rfcomm_channel, 19);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[bluetooth]\nauto_accept = true\ntrusted_devices = [\"00:11:22:33:44:55\", \"bogus\"]\n\n\
             [phonebook]\nowner_name = \"Car Phone\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(config.bluetooth.auto_accept);
        assert_eq!(config.bluetooth.rfcomm_channel, 19);
        assert_eq!(
            config.bluetooth.trusted_addresses(),
            vec![Address::new([0x00, 0x11, 0x22, 0x33, 0x44, 0x55])]
        );
        assert_eq!(config.owner_name(), "Car Phone");
        assert_eq!(config.phonebook.owner_number, "");
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.bluetooth.permission_timeout_secs = 5;
        config.phonebook.owner_number = "+15551234".into();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.bluetooth.permission_timeout_secs, 5);
        assert_eq!(loaded.phonebook.owner_number, "+15551234");
    }

    #[test]
    fn test_owner_name_falls_back_to_device_name() {
        let config = Config::default();
        assert_eq!(config.owner_name(), config.bluetooth.device_name);
    }
}
