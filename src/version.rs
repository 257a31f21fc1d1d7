// SPDX-License-Identifier: AGPL-3.0-or-later
//! Version gate for version-dependent config fragments
//!
//! The installed Vault binary reports something like `Vault v1.2.0 ('abc123')`.
//! We pull out the version token, parse it as a semantic version and compare
//! `major.minor.patch` numerically against the minimum. Output we cannot parse
//! closes the gate with a warning instead of failing the run; pre-release
//! builds print all sorts of things.

use std::cmp::Ordering;
use std::path::Path;
use std::process::Command;

use semver::Version;
use tracing::{debug, info, warn};

use crate::error::{Result, RunVaultError};

/// Source of the server's self-reported version string
pub trait VersionProbe {
    /// Raw version output of the server binary at `binary`
    fn version_output(&self, binary: &Path) -> Result<String>;
}

/// Runs `<binary> -v`
#[derive(Debug, Default, Clone, Copy)]
pub struct BinaryVersionProbe;

impl VersionProbe for BinaryVersionProbe {
    fn version_output(&self, binary: &Path) -> Result<String> {
        let what = format!("version of {}", binary.display());
        let output = Command::new(binary)
            .arg("-v")
            .output()
            .map_err(|e| RunVaultError::lookup(&what, e))?;

        if !output.status.success() {
            return Err(RunVaultError::lookup(
                what,
                format!(
                    "exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Extract and parse the first version-shaped token in `output`
pub fn parse_server_version(output: &str) -> Option<Version> {
    output
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| c == '(' || c == ')' || c == '\'' || c == ','))
        .map(|token| token.strip_prefix('v').unwrap_or(token))
        .filter(|token| token.starts_with(|c: char| c.is_ascii_digit()))
        .find_map(|token| Version::parse(token).ok())
}

/// Three-way comparison on `major.minor.patch` only
pub fn compare_release(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch).cmp(&(b.major, b.minor, b.patch))
}

/// Whether version-dependent fragments should be rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionGate {
    /// The web UI stanza is understood by this server
    pub ui_available: bool,
}

impl VersionGate {
    /// Probe the server at `binary` and compare it against `minimum`
    pub fn evaluate(probe: &dyn VersionProbe, binary: &Path, minimum: &Version) -> Self {
        let output = match probe.version_output(binary) {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "Could not query server version; disabling UI");
                return Self { ui_available: false };
            }
        };

        Self::from_output(&output, minimum)
    }

    /// Decide from raw version output
    pub fn from_output(output: &str, minimum: &Version) -> Self {
        let Some(version) = parse_server_version(output) else {
            warn!(output = %output.trim(), "Unrecognised server version output; disabling UI");
            return Self { ui_available: false };
        };

        let ui_available = compare_release(&version, minimum) != Ordering::Less;
        debug!(version = %version, minimum = %minimum, "Parsed server version");
        if ui_available {
            info!(version = %version, "Server supports the web UI");
        } else {
            info!(version = %version, minimum = %minimum, "Server predates the web UI");
        }

        Self { ui_available }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimum() -> Version {
        Version::new(0, 10, 0)
    }

    struct FixedProbe(Result<String>);

    impl VersionProbe for FixedProbe {
        fn version_output(&self, _binary: &Path) -> Result<String> {
            match &self.0 {
                Ok(output) => Ok(output.clone()),
                Err(_) => Err(RunVaultError::lookup("version", "not installed")),
            }
        }
    }

    #[test]
    fn test_parse_vault_banner() {
        let version = parse_server_version("Vault v1.2.0 ('e4f24d7dc4d5f0e2ed1ab05d3de1f7bf6bbb3aa9')").unwrap();
        assert_eq!(version, Version::new(1, 2, 0));
    }

    #[test]
    fn test_parse_prerelease_and_bare() {
        let version = parse_server_version("Vault v0.10.0-beta1 ('abc')").unwrap();
        assert_eq!((version.major, version.minor, version.patch), (0, 10, 0));
        assert_eq!(parse_server_version("0.9.9\n").unwrap(), Version::new(0, 9, 9));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_server_version("").is_none());
        assert!(parse_server_version("Vault vNEXT").is_none());
        assert!(parse_server_version("Vault v1.2").is_none());
    }

    #[test]
    fn test_comparison_is_numeric_not_lexical() {
        assert_eq!(
            compare_release(&Version::new(0, 9, 9), &minimum()),
            Ordering::Less
        );
        assert_eq!(
            compare_release(&Version::new(0, 10, 0), &minimum()),
            Ordering::Equal
        );
        assert_eq!(
            compare_release(&Version::new(0, 10, 4), &minimum()),
            Ordering::Greater
        );
    }

    #[test]
    fn test_gate_thresholds() {
        assert!(!VersionGate::from_output("Vault v0.9.9", &minimum()).ui_available);
        assert!(VersionGate::from_output("Vault v0.10.0", &minimum()).ui_available);
        assert!(VersionGate::from_output("Vault v0.10.4", &minimum()).ui_available);
        assert!(VersionGate::from_output("Vault v1.2.0 ('x')", &minimum()).ui_available);
    }

    #[test]
    fn test_prerelease_of_minimum_opens_gate() {
        assert!(VersionGate::from_output("Vault v0.10.0-rc1", &minimum()).ui_available);
    }

    #[test]
    fn test_malformed_version_closes_gate() {
        assert!(!VersionGate::from_output("Vault (devel)", &minimum()).ui_available);
    }

    #[test]
    fn test_failed_probe_closes_gate() {
        let probe = FixedProbe(Err(RunVaultError::lookup("version", "missing")));
        assert!(!VersionGate::evaluate(&probe, Path::new("vault"), &minimum()).ui_available);

        let probe = FixedProbe(Ok("Vault v1.0.0".to_string()));
        assert!(VersionGate::evaluate(&probe, Path::new("vault"), &minimum()).ui_available);
    }

    #[test]
    fn test_binary_probe_missing_binary() {
        assert!(matches!(
            BinaryVersionProbe.version_output(Path::new("/nonexistent/bin/vault")),
            Err(RunVaultError::ExternalLookupFailed { .. })
        ));
    }
}
