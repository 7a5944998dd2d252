use std::path::Path;

use sha2::{Digest, Sha256};

use crate::{KrakenError, KrakenResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Number of hex characters kept from a mount target digest.
pub const MOUNT_ID_LEN: usize = 7;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Checks that a mount target is `/`, or starts with `/` and has no trailing `/`.
pub fn validate_target(target: &str) -> KrakenResult<()> {
    if !target.starts_with('/') || (target != "/" && target.ends_with('/')) {
        return Err(KrakenError::InvalidMountTarget(target.to_string()));
    }

    Ok(())
}

/// Checks that a mount source is an absolute path.
///
/// Whether it exists is checked separately, when the mount is created.
pub fn validate_source(source: &Path) -> KrakenResult<()> {
    if !source.is_absolute() {
        return Err(KrakenError::InvalidMountSource(
            source.display().to_string(),
        ));
    }

    Ok(())
}

/// Returns the short identifier the admin API exposes for a mount target.
///
/// Identifiers are deterministic but truncated, so distinct targets may collide.
pub fn mount_id(target: &str) -> String {
    let digest = Sha256::digest(target.as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(MOUNT_ID_LEN);
    id
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
