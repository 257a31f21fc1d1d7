// SPDX-License-Identifier: AGPL-3.0-or-later
//! Built-in defaults for run-vault
//!
//! Every fixed constant the resolver and renderers rely on lives in
//! [`Defaults`]. The record is built once in `main` (optionally overlaid from a
//! TOML file) and handed down by reference; nothing reads globals.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, RunVaultError};

/// Immutable defaults consumed by the input resolver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Defaults {
    /// Listener port used when `--port` is omitted
    pub port: u16,

    /// Vault log level used when `--log-level` is omitted
    pub log_level: String,

    /// Config directory used when `--config-dir` is omitted.
    /// When unset, `<exe dir>/../config` is used.
    pub config_dir: Option<PathBuf>,

    /// Binary directory used when `--bin-dir` is omitted.
    /// When unset, `<exe dir>/../bin` is used.
    pub bin_dir: Option<PathBuf>,

    /// Name of the rendered Vault config file inside the config directory
    pub config_file_name: String,

    /// Where the systemd unit is written
    pub unit_path: PathBuf,

    /// systemd service name (without the `.service` suffix)
    pub service_name: String,

    /// Name of the Vault binary inside the binary directory
    pub server_binary: String,

    /// Tools that must be on the PATH before anything runs
    pub required_tools: Vec<String>,

    /// Base URL of the EC2 instance metadata service
    pub metadata_endpoint: String,

    /// Timeout for each metadata request
    pub metadata_timeout_secs: u64,

    /// First Vault version that ships the web UI
    pub min_ui_version: String,

    /// Address of the local Consul agent backing primary storage
    pub consul_address: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            port: 8200,
            log_level: "info".to_string(),
            config_dir: None,
            bin_dir: None,
            config_file_name: "default.hcl".to_string(),
            unit_path: PathBuf::from("/etc/systemd/system/vault.service"),
            service_name: "vault".to_string(),
            server_binary: "vault".to_string(),
            required_tools: ["systemctl", "aws", "curl", "jq"]
                .iter()
                .map(|tool| tool.to_string())
                .collect(),
            metadata_endpoint: "http://169.254.169.254/latest".to_string(),
            metadata_timeout_secs: 5,
            min_ui_version: "0.10.0".to_string(),
            consul_address: "127.0.0.1:8500".to_string(),
        }
    }
}

impl Defaults {
    /// Load defaults from a TOML file, keeping built-in values for absent keys.
    /// Unknown keys are rejected.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(RunVaultError::InvalidDefaults {
                message: format!("defaults file not found: {}", path.display()),
            });
        }

        let contents = std::fs::read_to_string(path)?;
        let defaults: Defaults = toml::from_str(&contents)?;

        defaults.validate()?;
        Ok(defaults)
    }

    /// Validate the defaults
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(RunVaultError::InvalidDefaults {
                message: "port cannot be 0".to_string(),
            });
        }

        if self.log_level.is_empty() {
            return Err(RunVaultError::InvalidDefaults {
                message: "log_level cannot be empty".to_string(),
            });
        }

        if self.config_file_name.is_empty() || self.config_file_name.contains('/') {
            return Err(RunVaultError::InvalidDefaults {
                message: format!("config_file_name must be a bare file name, got '{}'", self.config_file_name),
            });
        }

        if self.service_name.is_empty() || self.server_binary.is_empty() {
            return Err(RunVaultError::InvalidDefaults {
                message: "service_name and server_binary cannot be empty".to_string(),
            });
        }

        if self.metadata_timeout_secs == 0 {
            return Err(RunVaultError::InvalidDefaults {
                message: "metadata_timeout_secs cannot be 0".to_string(),
            });
        }

        if semver::Version::parse(&self.min_ui_version).is_err() {
            return Err(RunVaultError::InvalidDefaults {
                message: format!("min_ui_version '{}' is not a semantic version", self.min_ui_version),
            });
        }

        Ok(())
    }

    /// The effective defaults as TOML, in the same shape `from_file` reads
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Unit name as systemd knows it
    pub fn unit_name(&self) -> String {
        format!("{}.service", self.service_name)
    }

    /// Default config directory, relative to where the running binary lives
    pub fn default_config_dir(&self) -> Result<PathBuf> {
        match &self.config_dir {
            Some(dir) => Ok(dir.clone()),
            None => exe_sibling("config"),
        }
    }

    /// Default binary directory, relative to where the running binary lives
    pub fn default_bin_dir(&self) -> Result<PathBuf> {
        match &self.bin_dir {
            Some(dir) => Ok(dir.clone()),
            None => exe_sibling("bin"),
        }
    }
}

/// `<dir of current exe>/../<name>`
fn exe_sibling(name: &str) -> Result<PathBuf> {
    let exe = std::env::current_exe()?;
    let exe_dir = exe.parent().ok_or_else(|| RunVaultError::InvalidDefaults {
        message: format!("cannot determine directory of {}", exe.display()),
    })?;
    Ok(exe_dir.join("..").join(name))
}
