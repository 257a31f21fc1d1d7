// SPDX-License-Identifier: AGPL-3.0-or-later
//! systemd unit document for the Vault service

use std::path::{Path, PathBuf};

use tracing::info;

use super::write_document;
use crate::config::Defaults;
use crate::error::Result;
use crate::resolver::ResolvedConfig;

const DESCRIPTION: &str = "\"HashiCorp Vault - A tool for managing secrets\"";
const DOCUMENTATION: &str = "https://www.vaultproject.io/docs/";
const RESTART_SEC: u32 = 5;
const START_LIMIT_INTERVAL_SEC: u32 = 60;
const START_LIMIT_BURST: u32 = 3;
const TIMEOUT_STOP_SEC: u32 = 30;
const LIMIT_NOFILE: u32 = 65536;

/// One section of the unit file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitSection {
    /// `[Unit]`: metadata, ordering, start preconditions and rate limits
    Unit { config_path: PathBuf },

    /// `[Service]`: identity, sandboxing, command and restart policy
    Service {
        user: String,
        exec_start: String,
    },

    /// Output redirection, appended to `[Service]`
    Logging {
        stdout: Option<String>,
        stderr: Option<String>,
    },

    /// `[Install]`
    Install,
}

impl UnitSection {
    fn header(&self) -> Option<&'static str> {
        match self {
            UnitSection::Unit { .. } => Some("Unit"),
            UnitSection::Service { .. } => Some("Service"),
            UnitSection::Logging { .. } => None,
            UnitSection::Install => Some("Install"),
        }
    }

    fn directives(&self) -> Vec<(&'static str, String)> {
        match self {
            UnitSection::Unit { config_path } => vec![
                ("Description", DESCRIPTION.to_string()),
                ("Documentation", DOCUMENTATION.to_string()),
                ("Requires", "network-online.target".to_string()),
                ("After", "network-online.target".to_string()),
                ("ConditionFileNotEmpty", config_path.display().to_string()),
                ("StartLimitIntervalSec", START_LIMIT_INTERVAL_SEC.to_string()),
                ("StartLimitBurst", START_LIMIT_BURST.to_string()),
            ],

            UnitSection::Service { user, exec_start } => vec![
                ("User", user.clone()),
                ("Group", user.clone()),
                ("ProtectSystem", "full".to_string()),
                ("ProtectHome", "read-only".to_string()),
                ("PrivateTmp", "yes".to_string()),
                ("PrivateDevices", "yes".to_string()),
                ("SecureBits", "keep-caps".to_string()),
                ("AmbientCapabilities", "CAP_IPC_LOCK".to_string()),
                ("CapabilityBoundingSet", "CAP_SYSLOG CAP_IPC_LOCK".to_string()),
                ("NoNewPrivileges", "yes".to_string()),
                ("ExecStart", exec_start.clone()),
                ("ExecReload", "/bin/kill --signal HUP $MAINPID".to_string()),
                ("KillMode", "process".to_string()),
                ("KillSignal", "SIGINT".to_string()),
                ("Restart", "on-failure".to_string()),
                ("RestartSec", RESTART_SEC.to_string()),
                ("TimeoutStopSec", TIMEOUT_STOP_SEC.to_string()),
                ("LimitNOFILE", LIMIT_NOFILE.to_string()),
            ],

            UnitSection::Logging { stdout, stderr } => {
                let mut lines = Vec::new();
                if let Some(target) = stdout {
                    lines.push(("StandardOutput", target.clone()));
                }
                if let Some(target) = stderr {
                    lines.push(("StandardError", target.clone()));
                }
                lines
            }

            UnitSection::Install => vec![("WantedBy", "multi-user.target".to_string())],
        }
    }

    /// Render this section, header included when it has one
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(header) = self.header() {
            out.push_str(&format!("[{header}]\n"));
        }
        for (key, value) in self.directives() {
            out.push_str(&format!("{key}={value}\n"));
        }
        out
    }
}

/// The complete systemd unit file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitDocument {
    pub sections: Vec<UnitSection>,
}

impl UnitDocument {
    pub fn build(resolved: &ResolvedConfig, defaults: &Defaults) -> Self {
        let exec_start = format!(
            "{} server -config {} -log-level={}",
            resolved.server_binary(defaults).display(),
            resolved.config_dir.display(),
            resolved.log_level
        );

        let mut sections = vec![
            UnitSection::Unit {
                config_path: resolved.config_path(defaults),
            },
            UnitSection::Service {
                user: resolved.user.clone(),
                exec_start,
            },
        ];

        if resolved.systemd_stdout.is_some() || resolved.systemd_stderr.is_some() {
            sections.push(UnitSection::Logging {
                stdout: resolved.systemd_stdout.clone(),
                stderr: resolved.systemd_stderr.clone(),
            });
        }

        sections.push(UnitSection::Install);
        Self { sections }
    }

    /// Join all sections; headed sections are separated by a blank line
    pub fn render(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            if section.header().is_some() && !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&section.render());
        }
        out
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "Creating systemd config file");
        write_document(path, &self.render())
    }
}
