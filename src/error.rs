// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for run-vault

use thiserror::Error;

/// Result type alias for run-vault operations
pub type Result<T> = std::result::Result<T, RunVaultError>;

/// Errors that can occur while resolving, rendering or launching Vault
#[derive(Error, Debug)]
pub enum RunVaultError {
    /// A required (or conditionally required) option was not supplied
    #[error("The value for '{name}' cannot be empty")]
    MissingArgument { name: String },

    /// A required external tool is not on the PATH
    #[error("The binary '{tool}' is required by this tool but is not installed or in the system's PATH")]
    MissingDependency { tool: String },

    /// A metadata or ownership lookup failed, so a default cannot be derived
    #[error("Failed to look up {what}: {message}")]
    ExternalLookupFailed { what: String, message: String },

    /// Unknown command line flag
    #[error("Unrecognized argument: {option}")]
    UnrecognizedOption { option: String },

    /// An option was supplied but its value is unusable
    #[error("Invalid value for '{name}': {message}")]
    InvalidArgument { name: String, message: String },

    /// The defaults file is malformed or inconsistent
    #[error("Invalid defaults: {message}")]
    InvalidDefaults { message: String },

    /// systemd refused a reload or restart
    #[error("'{command}' failed: {message}")]
    LaunchFailed { command: String, message: String },

    /// IO error wrapper
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialize error: {0}")]
    TomlSerError(#[from] toml::ser::Error),
}

impl RunVaultError {
    /// Build an [`RunVaultError::ExternalLookupFailed`] from any displayable cause
    pub fn lookup(what: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        RunVaultError::ExternalLookupFailed {
            what: what.into(),
            message: cause.to_string(),
        }
    }

    /// Whether the operator should be shown usage text alongside this error
    pub fn wants_usage(&self) -> bool {
        matches!(
            self,
            RunVaultError::MissingArgument { .. } | RunVaultError::UnrecognizedOption { .. }
        )
    }
}
