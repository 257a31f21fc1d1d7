// SPDX-License-Identifier: AGPL-3.0-or-later
//! Input resolution
//!
//! Turns raw command line values into a [`ResolvedConfig`]. Validation of
//! required options is pure and runs first; then the prerequisite tools are
//! checked; then defaults are derived from the host.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::config::Defaults;
use crate::error::{Result, RunVaultError};
use crate::lookup::{check_prerequisites, FileOwnerLookup, InstanceMetadataProvider};

/// Unvalidated option values as given on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOptions {
    pub tls_cert_file: Option<String>,
    pub tls_key_file: Option<String>,
    pub port: Option<u16>,
    pub cluster_port: Option<u16>,
    pub api_addr: Option<String>,
    pub config_dir: Option<PathBuf>,
    pub bin_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub systemd_stdout: Option<String>,
    pub systemd_stderr: Option<String>,
    pub user: Option<String>,
    pub skip_vault_config: bool,
    pub enable_s3_backend: bool,
    pub s3_bucket: Option<String>,
    pub s3_bucket_region: Option<String>,
    pub enable_auto_unseal: bool,
    pub auto_unseal_kms_key_id: Option<String>,
    pub auto_unseal_kms_key_region: Option<String>,
    pub auto_unseal_endpoint: Option<String>,
}

/// How Vault's storage is laid out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLayout {
    /// Consul holds the data and does HA coordination
    ConsulOnly,
    /// S3 holds the data, Consul only does HA coordination
    S3WithConsulHa { bucket: String, region: String },
}

/// AWS KMS auto-unseal settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoUnseal {
    pub kms_key_id: String,
    pub region: String,
    pub endpoint: Option<String>,
}

/// Fully resolved settings shared by both renderers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub tls_cert_file: String,
    pub tls_key_file: String,
    pub port: u16,
    pub cluster_port: u16,
    pub api_addr: String,
    /// Private IP of this instance, used for `cluster_addr`
    pub instance_ip: String,
    pub config_dir: PathBuf,
    pub bin_dir: PathBuf,
    pub log_level: String,
    pub systemd_stdout: Option<String>,
    pub systemd_stderr: Option<String>,
    pub user: String,
    pub storage: StorageLayout,
    pub auto_unseal: Option<AutoUnseal>,
    pub skip_vault_config: bool,
}

impl ResolvedConfig {
    /// `https://<instance ip>:<cluster port>`
    pub fn cluster_addr(&self) -> String {
        format!("https://{}:{}", self.instance_ip, self.cluster_port)
    }

    /// Path of the Vault binary
    pub fn server_binary(&self, defaults: &Defaults) -> PathBuf {
        self.bin_dir.join(&defaults.server_binary)
    }

    /// Path of the rendered Vault config file
    pub fn config_path(&self, defaults: &Defaults) -> PathBuf {
        self.config_dir.join(&defaults.config_file_name)
    }
}

/// Values that survived validation but still need host-derived defaults
#[derive(Debug)]
struct Validated {
    tls_cert_file: String,
    tls_key_file: String,
    storage: StorageLayout,
    auto_unseal: Option<AutoUnseal>,
}

/// Resolves [`RawOptions`] against [`Defaults`] and host lookups
pub struct InputResolver<'a> {
    defaults: &'a Defaults,
    metadata: &'a dyn InstanceMetadataProvider,
    owners: &'a dyn FileOwnerLookup,
}

impl<'a> InputResolver<'a> {
    pub fn new(
        defaults: &'a Defaults,
        metadata: &'a dyn InstanceMetadataProvider,
        owners: &'a dyn FileOwnerLookup,
    ) -> Self {
        Self {
            defaults,
            metadata,
            owners,
        }
    }

    /// Validate, check prerequisites and derive every default
    pub fn resolve(&self, raw: &RawOptions) -> Result<ResolvedConfig> {
        let validated = validate(raw)?;
        check_prerequisites(self.defaults.required_tools.as_slice())?;

        let port = raw.port.unwrap_or(self.defaults.port);
        let cluster_port = match raw.cluster_port {
            Some(cluster_port) => cluster_port,
            None => port.checked_add(1).ok_or_else(|| RunVaultError::InvalidArgument {
                name: "--port".to_string(),
                message: format!("no room for a default cluster port above {port}"),
            })?,
        };

        let config_dir = match &raw.config_dir {
            Some(dir) => dir.clone(),
            None => self.defaults.default_config_dir()?,
        };
        let bin_dir = match &raw.bin_dir {
            Some(dir) => dir.clone(),
            None => self.defaults.default_bin_dir()?,
        };
        let log_level = non_empty(&raw.log_level).unwrap_or_else(|| self.defaults.log_level.clone());

        let instance_ip = self.metadata.private_ip()?;
        debug!(instance_ip = %instance_ip, "Resolved instance IP");

        let api_addr = non_empty(&raw.api_addr)
            .unwrap_or_else(|| format!("https://{instance_ip}:{port}"));

        let user = match non_empty(&raw.user) {
            Some(user) => user,
            None => self.owners.owner_of(&config_dir)?,
        };

        let resolved = ResolvedConfig {
            tls_cert_file: validated.tls_cert_file,
            tls_key_file: validated.tls_key_file,
            port,
            cluster_port,
            api_addr,
            instance_ip,
            config_dir,
            bin_dir,
            log_level,
            systemd_stdout: non_empty(&raw.systemd_stdout),
            systemd_stderr: non_empty(&raw.systemd_stderr),
            user,
            storage: validated.storage,
            auto_unseal: validated.auto_unseal,
            skip_vault_config: raw.skip_vault_config,
        };

        info!(
            port = resolved.port,
            cluster_port = resolved.cluster_port,
            api_addr = %resolved.api_addr,
            user = %resolved.user,
            config_dir = %resolved.config_dir.display(),
            s3 = matches!(resolved.storage, StorageLayout::S3WithConsulHa { .. }),
            auto_unseal = resolved.auto_unseal.is_some(),
            "Resolved Vault settings"
        );

        Ok(resolved)
    }
}

/// Check required and conditionally required options without touching the host
fn validate(raw: &RawOptions) -> Result<Validated> {
    let tls_cert_file = required(&raw.tls_cert_file, "--tls-cert-file")?;
    let tls_key_file = required(&raw.tls_key_file, "--tls-key-file")?;

    let storage = if raw.enable_s3_backend {
        StorageLayout::S3WithConsulHa {
            bucket: required(&raw.s3_bucket, "--s3-bucket")?,
            region: required(&raw.s3_bucket_region, "--s3-bucket-region")?,
        }
    } else {
        StorageLayout::ConsulOnly
    };

    let auto_unseal = if raw.enable_auto_unseal {
        Some(AutoUnseal {
            kms_key_id: required(&raw.auto_unseal_kms_key_id, "--auto-unseal-kms-key-id")?,
            region: required(&raw.auto_unseal_kms_key_region, "--auto-unseal-kms-key-region")?,
            endpoint: non_empty(&raw.auto_unseal_endpoint),
        })
    } else {
        None
    };

    if raw.port == Some(0) {
        return Err(RunVaultError::InvalidArgument {
            name: "--port".to_string(),
            message: "port cannot be 0".to_string(),
        });
    }
    if raw.cluster_port == Some(0) {
        return Err(RunVaultError::InvalidArgument {
            name: "--cluster-port".to_string(),
            message: "port cannot be 0".to_string(),
        });
    }

    Ok(Validated {
        tls_cert_file,
        tls_key_file,
        storage,
        auto_unseal,
    })
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Blank values count as missing; anything else is kept verbatim
fn required(value: &Option<String>, name: &str) -> Result<String> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| RunVaultError::MissingArgument {
            name: name.to_string(),
        })
}
