// SPDX-License-Identifier: AGPL-3.0-or-later
//! Rendering of the Vault config file and the systemd unit
//!
//! Both documents are ordered lists of typed pieces joined by a single
//! `render()` step, and both are replaced wholesale on every run.

pub mod config;
pub mod unit;

pub use config::{ConfigDocument, ConfigFragment, StorageRole};
pub use unit::{UnitDocument, UnitSection};

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::info;

use crate::error::{Result, RunVaultError};

/// Write `contents` to `path` through a temporary sibling and a rename,
/// so readers never observe a half-written file. The temporary file is
/// removed if any step fails.
pub fn write_document(path: &Path, contents: &str) -> Result<()> {
    if path.file_name().is_none() {
        return Err(RunVaultError::InvalidArgument {
            name: path.display().to_string(),
            message: "not a file path".to_string(),
        });
    }
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents.as_bytes())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    info!(path = %path.display(), bytes = contents.len(), "Wrote file");
    Ok(())
}
