// SPDX-License-Identifier: AGPL-3.0-or-later
//! The resolve → gate → render → launch sequence
//!
//! Every host interaction is injected so a whole run can be exercised
//! against fakes.

use std::path::PathBuf;

use semver::Version;
use tracing::{debug, info};

use crate::config::Defaults;
use crate::error::{Result, RunVaultError};
use crate::launcher::{Launcher, Supervisor};
use crate::lookup::{FileOwnerLookup, InstanceMetadataProvider};
use crate::render::{ConfigDocument, UnitDocument};
use crate::resolver::{InputResolver, RawOptions, ResolvedConfig};
use crate::version::{VersionGate, VersionProbe};

/// Host capabilities a run depends on
pub struct Capabilities<'a> {
    pub metadata: &'a dyn InstanceMetadataProvider,
    pub owners: &'a dyn FileOwnerLookup,
    pub probe: &'a dyn VersionProbe,
    pub supervisor: &'a dyn Supervisor,
}

/// Outcome of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub resolved: ResolvedConfig,
    /// Rendered Vault config, `None` when `--skip-vault-config` was given
    pub config: Option<String>,
    pub unit: String,
    /// Where the Vault config was (or would be) written
    pub config_path: PathBuf,
    pub unit_path: PathBuf,
    pub ui_enabled: bool,
    /// Nothing was written and nothing was restarted
    pub dry_run: bool,
}

/// Drives one full run
pub struct Pipeline<'a> {
    defaults: &'a Defaults,
    caps: Capabilities<'a>,
    dry_run: bool,
}

impl<'a> Pipeline<'a> {
    pub fn new(defaults: &'a Defaults, caps: Capabilities<'a>, dry_run: bool) -> Self {
        Self {
            defaults,
            caps,
            dry_run,
        }
    }

    /// Resolve inputs, render both documents, write them and restart Vault
    pub fn run(&self, raw: &RawOptions) -> Result<RunReport> {
        let min_ui_version = Version::parse(&self.defaults.min_ui_version).map_err(|e| {
            RunVaultError::InvalidDefaults {
                message: format!("min_ui_version: {e}"),
            }
        })?;

        let resolved =
            InputResolver::new(self.defaults, self.caps.metadata, self.caps.owners).resolve(raw)?;
        let config_path = resolved.config_path(self.defaults);

        let (config, ui_enabled) = if resolved.skip_vault_config {
            info!("--skip-vault-config set, not generating Vault config");
            (None, false)
        } else {
            let gate = VersionGate::evaluate(
                self.caps.probe,
                &resolved.server_binary(self.defaults),
                &min_ui_version,
            );
            let document = ConfigDocument::build(&resolved, gate, self.defaults);
            (Some(document), gate.ui_available)
        };
        let unit = UnitDocument::build(&resolved, self.defaults);

        let report = RunReport {
            config: config.as_ref().map(ConfigDocument::render),
            unit: unit.render(),
            config_path: config_path.clone(),
            unit_path: self.defaults.unit_path.clone(),
            ui_enabled,
            dry_run: self.dry_run,
            resolved,
        };

        if self.dry_run {
            info!("Dry run, nothing written or restarted");
            return Ok(report);
        }

        if let Some(document) = &config {
            document.persist(&config_path, self.caps.owners, &report.resolved.user)?;
        }
        unit.persist(&self.defaults.unit_path)?;

        Launcher::new(self.caps.supervisor).launch(&self.defaults.unit_name())?;
        debug!(unit_path = %report.unit_path.display(), "Run complete");
        Ok(report)
    }
}
