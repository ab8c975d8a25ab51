//! Configuration file support for toppy.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (TOPPY_*)
//! 3. Local config file (./toppy.toml)
//! 4. Global config file (~/.config/toppy/config.toml)
//!
//! ```toml
//! [device]
//! bus = "1"
//! address = 7
//!
//! [protocol]
//! ignore_crc = false
//! strict_crc = false
//! timeout_ms = 11000
//!
//! [output]
//! quiet = false
//! ```

use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the per-directory config file.
pub const LOCAL_CONFIG_FILE: &str = "toppy.toml";

/// Device selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceConfig {
    /// USB bus identifier.
    pub bus: Option<String>,
    /// USB device address on that bus.
    pub address: Option<u8>,
}

/// Protocol behaviour.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Accept packets with bad CRCs silently.
    #[serde(default)]
    pub ignore_crc: bool,
    /// Reject packets with bad CRCs.
    #[serde(default)]
    pub strict_crc: bool,
    /// Timeout per USB transfer, in milliseconds.
    pub timeout_ms: Option<u64>,
}

/// Output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputConfig {
    /// Suppress progress output.
    #[serde(default)]
    pub quiet: bool,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Device selection.
    #[serde(default)]
    pub device: DeviceConfig,
    /// Protocol settings.
    #[serde(default)]
    pub protocol: ProtocolConfig,
    /// Output settings.
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config.warn_on_conflicts();
        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config.warn_on_conflicts();
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => Self::parse(&content)
                .inspect_err(|e| {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                })
                .ok(),
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Parse a TOML document.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "toppy").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Whether both CRC switches ended up set.
    pub fn crc_conflict(&self) -> bool {
        self.protocol.ignore_crc && self.protocol.strict_crc
    }

    fn warn_on_conflicts(&self) {
        if self.crc_conflict() {
            warn!("Config sets both protocol.ignore_crc and protocol.strict_crc; using strict_crc");
        }
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        if other.device.bus.is_some() {
            self.device.bus = other.device.bus;
        }
        if other.device.address.is_some() {
            self.device.address = other.device.address;
        }

        if other.protocol.ignore_crc {
            self.protocol.ignore_crc = true;
        }
        if other.protocol.strict_crc {
            self.protocol.strict_crc = true;
        }
        if other.protocol.timeout_ms.is_some() {
            self.protocol.timeout_ms = other.protocol.timeout_ms;
        }

        if other.output.quiet {
            self.output.quiet = true;
        }
    }
}
