//! Filesystem utilities.
//!
//! Writers in this crate never leave a half-written file at the final path:
//! content goes to a sibling temp file first and is renamed into place, so
//! readers see either the old file or the complete new one.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Sibling temp path used while writing `path` (`<name>.tmp`).
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name: OsString = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Atomically replace `path` with `contents`.
///
/// The parent directory is created if needed. The temp file lives in the
/// same directory so the final rename never crosses filesystems.
pub async fn write_atomic(path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> MediaResult<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    let tmp = temp_path_for(path);

    fs::write(&tmp, contents.as_ref()).await.map_err(|e| {
        tracing::error!("Failed to write temp file {}: {}", tmp.display(), e);
        MediaError::from(e)
    })?;

    fs::rename(&tmp, path).await.map_err(|e| {
        // Clean up temp file on failure
        let _ = std::fs::remove_file(&tmp);
        tracing::error!(
            "Failed to rename temp file into place: {} -> {}: {}",
            tmp.display(),
            path.display(),
            e
        );
        MediaError::from(e)
    })?;

    Ok(())
}

/// Remove a file, treating "already gone" as success.
pub async fn remove_if_exists(path: impl AsRef<Path>) -> MediaResult<()> {
    match fs::remove_file(path.as_ref()).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
