// SPDX-License-Identifier: AGPL-3.0-or-later
//! File ownership via the system user database

use std::os::unix::fs::MetadataExt;
use std::path::Path;

use nix::unistd::{chown, Group, Uid, User};
use tracing::debug;

use super::FileOwnerLookup;
use crate::error::{Result, RunVaultError};

/// Resolves and changes ownership using `getpwuid`/`getgrnam` and `chown(2)`
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixFileOwners;

impl FileOwnerLookup for UnixFileOwners {
    fn owner_of(&self, path: &Path) -> Result<String> {
        let what = format!("owner of {}", path.display());
        let metadata = std::fs::metadata(path).map_err(|e| RunVaultError::lookup(&what, e))?;
        let uid = Uid::from_raw(metadata.uid());

        match User::from_uid(uid) {
            Ok(Some(user)) => Ok(user.name),
            Ok(None) => Err(RunVaultError::lookup(what, format!("no user with uid {uid}"))),
            Err(e) => Err(RunVaultError::lookup(what, e)),
        }
    }

    fn set_owner(&self, path: &Path, user: &str, group: &str) -> Result<()> {
        let uid = User::from_name(user)
            .map_err(|e| RunVaultError::lookup(format!("user '{user}'"), e))?
            .ok_or_else(|| RunVaultError::lookup(format!("user '{user}'"), "no such user"))?
            .uid;
        let gid = Group::from_name(group)
            .map_err(|e| RunVaultError::lookup(format!("group '{group}'"), e))?
            .ok_or_else(|| RunVaultError::lookup(format!("group '{group}'"), "no such group"))?
            .gid;

        debug!(path = %path.display(), user = %user, group = %group, "Changing ownership");
        chown(path, Some(uid), Some(gid)).map_err(std::io::Error::from)?;
        Ok(())
    }
}
