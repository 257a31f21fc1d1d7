// SPDX-License-Identifier: AGPL-3.0-or-later
//! run-vault: renders Vault's server config and systemd unit, then restarts Vault
//!
//! Meant to run once per deployment action on an EC2 host (typically from
//! user data), not as a daemon.
//!
//! # Pipeline
//!
//! * **Resolve:** validate options, check prerequisite tools, derive defaults
//!   from instance metadata and filesystem ownership
//! * **Gate:** ask the Vault binary for its version to decide on the UI stanza
//! * **Render:** build the HCL config and the systemd unit from typed pieces
//! * **Launch:** `systemctl daemon-reload` and `systemctl restart vault.service`

pub mod config;
pub mod error;
pub mod launcher;
pub mod lookup;
pub mod pipeline;
pub mod render;
pub mod resolver;
pub mod version;

pub use config::Defaults;
pub use error::{Result, RunVaultError};
pub use pipeline::{Capabilities, Pipeline, RunReport};
pub use resolver::{RawOptions, ResolvedConfig};
