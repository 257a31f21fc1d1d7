// SPDX-License-Identifier: AGPL-3.0-or-later
//! Vault HCL config document

use std::path::Path;

use tracing::{debug, info};

use super::write_document;
use crate::config::Defaults;
use crate::error::Result;
use crate::lookup::FileOwnerLookup;
use crate::resolver::{AutoUnseal, ResolvedConfig, StorageLayout};
use crate::version::VersionGate;

/// Role the Consul backend plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageRole {
    /// Sole data store (`storage`)
    Primary,
    /// Lock/leader-election provider only (`ha_storage`)
    HighAvailability,
}

impl StorageRole {
    fn stanza(self) -> &'static str {
        match self {
            StorageRole::Primary => "storage",
            StorageRole::HighAvailability => "ha_storage",
        }
    }
}

/// One top-level piece of the Vault config
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigFragment {
    /// `ui = true`
    Ui,

    /// `seal "awskms"`
    Seal(AutoUnseal),

    /// `listener "tcp"`
    Listener {
        port: u16,
        cluster_port: u16,
        tls_cert_file: String,
        tls_key_file: String,
    },

    /// `storage "s3"`
    S3Storage { bucket: String, region: String },

    /// `storage "consul"` or `ha_storage "consul"`, plus the HA addresses
    ConsulStorage {
        role: StorageRole,
        consul_address: String,
        service: String,
        cluster_addr: String,
        api_addr: String,
    },
}

impl ConfigFragment {
    /// Render this fragment as HCL, newline terminated
    pub fn render(&self) -> String {
        match self {
            ConfigFragment::Ui => "ui = true\n".to_string(),

            ConfigFragment::Seal(unseal) => {
                let mut entries = vec![
                    ("kms_key_id", unseal.kms_key_id.clone()),
                    ("region", unseal.region.clone()),
                ];
                if let Some(endpoint) = &unseal.endpoint {
                    entries.push(("endpoint", endpoint.clone()));
                }
                block("seal", "awskms", &entries)
            }

            ConfigFragment::Listener {
                port,
                cluster_port,
                tls_cert_file,
                tls_key_file,
            } => block(
                "listener",
                "tcp",
                &[
                    ("address", format!("0.0.0.0:{port}")),
                    ("cluster_address", format!("0.0.0.0:{cluster_port}")),
                    ("tls_cert_file", tls_cert_file.clone()),
                    ("tls_key_file", tls_key_file.clone()),
                ],
            ),

            ConfigFragment::S3Storage { bucket, region } => block(
                "storage",
                "s3",
                &[("bucket", bucket.clone()), ("region", region.clone())],
            ),

            ConfigFragment::ConsulStorage {
                role,
                consul_address,
                service,
                cluster_addr,
                api_addr,
            } => {
                let mut out = block(
                    role.stanza(),
                    "consul",
                    &[
                        ("address", consul_address.clone()),
                        ("path", format!("{service}/")),
                        ("scheme", "http".to_string()),
                        ("service", service.clone()),
                    ],
                );
                out.push_str("\n# HA settings\n");
                out.push_str(&assignments(&[
                    ("cluster_addr", cluster_addr.clone()),
                    ("api_addr", api_addr.clone()),
                ]));
                out
            }
        }
    }
}

/// The complete Vault config file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDocument {
    pub fragments: Vec<ConfigFragment>,
}

impl ConfigDocument {
    /// Assemble the fragments selected by `resolved` and `gate`
    pub fn build(resolved: &ResolvedConfig, gate: VersionGate, defaults: &Defaults) -> Self {
        let mut fragments = Vec::new();

        if gate.ui_available {
            fragments.push(ConfigFragment::Ui);
        }

        if let Some(unseal) = &resolved.auto_unseal {
            fragments.push(ConfigFragment::Seal(unseal.clone()));
        }

        fragments.push(ConfigFragment::Listener {
            port: resolved.port,
            cluster_port: resolved.cluster_port,
            tls_cert_file: resolved.tls_cert_file.clone(),
            tls_key_file: resolved.tls_key_file.clone(),
        });

        let role = match &resolved.storage {
            StorageLayout::ConsulOnly => StorageRole::Primary,
            StorageLayout::S3WithConsulHa { bucket, region } => {
                fragments.push(ConfigFragment::S3Storage {
                    bucket: bucket.clone(),
                    region: region.clone(),
                });
                StorageRole::HighAvailability
            }
        };

        fragments.push(ConfigFragment::ConsulStorage {
            role,
            consul_address: defaults.consul_address.clone(),
            service: defaults.service_name.clone(),
            cluster_addr: resolved.cluster_addr(),
            api_addr: resolved.api_addr.clone(),
        });

        debug!(fragments = fragments.len(), "Built Vault config document");
        Self { fragments }
    }

    /// Join all fragments into the final file contents
    pub fn render(&self) -> String {
        self.fragments
            .iter()
            .map(ConfigFragment::render)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Write to `path` and hand the file to `user:user`
    pub fn persist(&self, path: &Path, owners: &dyn FileOwnerLookup, user: &str) -> Result<()> {
        info!(path = %path.display(), "Creating Vault config file");
        write_document(path, &self.render())?;
        owners.set_owner(path, user, user)?;
        Ok(())
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn assignments(entries: &[(&str, String)]) -> String {
    let width = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    entries
        .iter()
        .map(|(key, value)| format!("{key:<width$} = {}\n", quote(value)))
        .collect()
}

fn block(kind: &str, label: &str, entries: &[(&str, String)]) -> String {
    let body: String = assignments(entries)
        .lines()
        .map(|line| format!("  {line}\n"))
        .collect();
    format!("{kind} {} {{\n{body}}}\n", quote(label))
}
