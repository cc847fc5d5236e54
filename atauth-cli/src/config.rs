//! Configuration file support for atauth.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (ATAUTH_*)
//! 3. Local config file (./atauth.toml)
//! 4. Global config file (~/.config/atauth/config.toml)

use anyhow::Result;
use atauth::{DataBits, FlowControl, Parity, SerialConfig, StopBits};
use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the per-directory config file.
pub const LOCAL_CONFIG_FILE: &str = "atauth.toml";

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyUSB0" or "COM3").
    pub serial: Option<String>,
    /// Default baud rate.
    pub baud: Option<u32>,
    /// Data bits (7 or 8).
    pub data_bits: Option<u8>,
    /// Parity ("none", "odd", "even").
    pub parity: Option<String>,
    /// Stop bits (1 or 2).
    pub stop_bits: Option<u8>,
    /// Flow control ("none", "hardware", "software").
    pub flow_control: Option<String>,
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Pre-shared key as 32 hex characters.
    pub key: Option<String>,
    /// File holding the pre-shared key as hex.
    pub key_file: Option<PathBuf>,
    /// Buffer typed input until Enter in the interactive terminal.
    pub line_buffered: Option<bool>,
    /// Give up waiting for the challenge after this many seconds.
    pub challenge_timeout_secs: Option<u64>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Authentication settings.
    #[serde(default)]
    pub auth: AuthConfig,
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

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
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
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse TOML config {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "atauth").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one; set values in `other` win.
    fn merge(&mut self, other: Self) {
        let conn = other.connection;
        merge_opt(&mut self.connection.serial, conn.serial);
        merge_opt(&mut self.connection.baud, conn.baud);
        merge_opt(&mut self.connection.data_bits, conn.data_bits);
        merge_opt(&mut self.connection.parity, conn.parity);
        merge_opt(&mut self.connection.stop_bits, conn.stop_bits);
        merge_opt(&mut self.connection.flow_control, conn.flow_control);

        let auth = other.auth;
        // A key and a key file from the same layer replace both from below.
        if auth.key.is_some() || auth.key_file.is_some() {
            self.auth.key = auth.key;
            self.auth.key_file = auth.key_file;
        }
        merge_opt(&mut self.auth.line_buffered, auth.line_buffered);
        merge_opt(
            &mut self.auth.challenge_timeout_secs,
            auth.challenge_timeout_secs,
        );
    }

    /// Build the serial settings for `port_name`, applying configured framing.
    pub fn serial_config(&self, port_name: &str, baud: u32) -> Result<SerialConfig> {
        let conn = &self.connection;
        let data_bits = conn
            .data_bits
            .map(DataBits::try_from)
            .transpose()?
            .unwrap_or_default();
        let parity = conn
            .parity
            .as_deref()
            .map(str::parse::<Parity>)
            .transpose()?
            .unwrap_or_default();
        let stop_bits = conn
            .stop_bits
            .map(StopBits::try_from)
            .transpose()?
            .unwrap_or_default();
        let flow_control = conn
            .flow_control
            .as_deref()
            .map(str::parse::<FlowControl>)
            .transpose()?
            .unwrap_or_default();

        Ok(SerialConfig::new(port_name, baud)
            .with_framing(data_bits, parity, stop_bits)
            .with_flow_control(flow_control))
    }

    /// Configured challenge timeout, if any.
    pub fn challenge_timeout(&self) -> Option<Duration> {
        self.auth
            .challenge_timeout_secs
            .map(Duration::from_secs)
    }
}

fn merge_opt<T>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}
