//! Filesystem locations for the audit store.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use directories::ProjectDirs;

pub fn data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("PAGELOCK_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let dirs = ProjectDirs::from("com", "Pagelock", "pagelock-audit")
        .ok_or_else(|| anyhow!("could not determine a data directory"))?;
    Ok(dirs.data_dir().to_path_buf())
}

pub fn db_path(data: &std::path::Path) -> PathBuf {
    data.join("audit.db")
}

pub fn salt_path(data: &std::path::Path) -> PathBuf {
    data.join("vault.salt")
}
