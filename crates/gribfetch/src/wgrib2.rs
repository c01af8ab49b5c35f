//! Optional wrapper around the external `wgrib2` utility.
//!
//! When no index file can be located but the GRIB itself is on disk,
//! `wgrib2 -s` can synthesize a wgrib2-dialect inventory. The binary is
//! probed once at startup; features that need it stay disabled when it
//! is absent.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::debug;

use crate::error::Result;

/// Locate `wgrib2` on `PATH`, if installed.
pub fn find_wgrib2() -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join("wgrib2");
        if candidate.is_file() {
            debug!(path = %candidate.display(), "Found wgrib2");
            return Some(candidate);
        }
    }
    None
}

/// Run `wgrib2 -s` on a local GRIB2 file and return the inventory text.
pub async fn make_inventory(exe: &Path, grib: &Path) -> Result<String> {
    let output = Command::new(exe).arg("-s").arg(grib).output().await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("wgrib2 failed with {}: {}", output.status, stderr.trim()),
        )
        .into());
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
