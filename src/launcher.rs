// SPDX-License-Identifier: AGPL-3.0-or-later
//! Service (re)start through the process supervisor
//!
//! Failures are returned as-is. There is no retry: a restart that fails
//! usually means the rendered config is wrong, and that needs an operator.

use std::path::PathBuf;
use std::process::Command;

use tracing::info;

use crate::error::{Result, RunVaultError};

/// Operations the launcher needs from the process supervisor
pub trait Supervisor {
    /// Re-read unit definitions from disk
    fn reload(&self) -> Result<()>;

    /// Restart (or start) the named unit
    fn restart(&self, unit: &str) -> Result<()>;
}

/// `systemctl`-backed supervisor
#[derive(Debug, Clone)]
pub struct Systemctl {
    program: PathBuf,
}

impl Default for Systemctl {
    fn default() -> Self {
        Self::with_program("systemctl")
    }
}

impl Systemctl {
    /// Use a specific control binary instead of `systemctl` from the PATH
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<()> {
        let command = format!("{} {}", self.program.display(), args.join(" "));
        info!(command = %command, "Running supervisor command");

        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| RunVaultError::LaunchFailed {
                command: command.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(RunVaultError::LaunchFailed {
                command,
                message: format!(
                    "exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }
}

impl Supervisor for Systemctl {
    fn reload(&self) -> Result<()> {
        self.run(&["daemon-reload"])
    }

    fn restart(&self, unit: &str) -> Result<()> {
        self.run(&["restart", unit])
    }
}

/// Applies freshly written unit files and restarts the service
pub struct Launcher<'a> {
    supervisor: &'a dyn Supervisor,
}

impl<'a> Launcher<'a> {
    pub fn new(supervisor: &'a dyn Supervisor) -> Self {
        Self { supervisor }
    }

    pub fn launch(&self, unit: &str) -> Result<()> {
        info!("Reloading systemd config and starting Vault");
        self.supervisor.reload()?;
        self.supervisor.restart(unit)?;
        info!(unit = %unit, "Restart requested");
        Ok(())
    }
}
