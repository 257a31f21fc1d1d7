// SPDX-License-Identifier: AGPL-3.0-or-later
//! Host lookups the resolver and renderers depend on
//!
//! Each lookup sits behind a trait so the pipeline can be driven with
//! deterministic fakes in tests.

mod metadata;
mod owner;

pub use metadata::Ec2MetadataClient;
pub use owner::UnixFileOwners;

use std::path::Path;
use tracing::debug;

use crate::error::{Result, RunVaultError};

/// Path-based key lookup against the instance metadata service
pub trait InstanceMetadataProvider {
    /// Fetch the value stored under `key` (e.g. `local-ipv4`)
    fn get(&self, key: &str) -> Result<String>;

    /// Private IPv4 address of this instance
    fn private_ip(&self) -> Result<String> {
        self.get("local-ipv4")
    }
}

/// Filesystem ownership lookups and changes
pub trait FileOwnerLookup {
    /// Name of the user owning `path`
    fn owner_of(&self, path: &Path) -> Result<String>;

    /// Change ownership of `path` to `user:group`
    fn set_owner(&self, path: &Path, user: &str, group: &str) -> Result<()>;
}

/// Verify that every tool in `tools` can be found on the PATH
pub fn check_prerequisites<S: AsRef<str>>(tools: &[S]) -> Result<()> {
    for tool in tools {
        let tool = tool.as_ref();
        match which::which(tool) {
            Ok(path) => debug!(tool = %tool, path = %path.display(), "Found prerequisite"),
            Err(_) => {
                return Err(RunVaultError::MissingDependency {
                    tool: tool.to_string(),
                })
            }
        }
    }
    Ok(())
}
