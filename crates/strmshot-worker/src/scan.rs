//! `.strm` discovery and path scoping.

use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{WorkerError, WorkerResult};

/// Extension of source descriptor files.
pub const STRM_EXTENSION: &str = "strm";

fn is_strm(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case(STRM_EXTENSION))
        .unwrap_or(false)
}

/// Recursively list `.strm` files under `root`, sorted.
///
/// Unreadable entries are logged and skipped. Symlinks are not followed.
pub fn find_strm_files(root: &Path) -> WorkerResult<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(WorkerError::invalid_source(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry during scan");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_strm(entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    debug!(root = %root.display(), count = files.len(), "Scanned for .strm files");
    Ok(files)
}

/// Async wrapper around [`find_strm_files`] returning identifiers.
pub async fn scan_directory(root: PathBuf) -> WorkerResult<Vec<String>> {
    let files = tokio::task::spawn_blocking(move || find_strm_files(&root))
        .await
        .map_err(|e| WorkerError::invalid_source(format!("scan task failed: {}", e)))??;

    Ok(files
        .into_iter()
        .map(|p| p.to_string_lossy().to_string())
        .collect())
}

/// Canonicalize `path` and require it to lie under `root`.
pub async fn ensure_within_root(path: &Path, root: &Path) -> WorkerResult<PathBuf> {
    let root = tokio::fs::canonicalize(root)
        .await
        .map_err(|e| WorkerError::config_error(format!("media root {}: {}", root.display(), e)))?;
    let resolved = tokio::fs::canonicalize(path)
        .await
        .map_err(|e| WorkerError::invalid_source(format!("{}: {}", path.display(), e)))?;

    if resolved.starts_with(&root) {
        Ok(resolved)
    } else {
        Err(WorkerError::out_of_scope(path.display().to_string()))
    }
}

/// Like [`ensure_within_root`], but `path` may not exist yet (an output
/// directory that will be created). Non-existent paths are checked
/// lexically and must not contain `..`.
pub async fn ensure_output_within_root(path: &Path, root: &Path) -> WorkerResult<()> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        return ensure_within_root(path, root).await.map(|_| ());
    }

    let has_parent_ref = path.components().any(|c| matches!(c, Component::ParentDir));
    let root = tokio::fs::canonicalize(root).await.unwrap_or_else(|_| root.to_path_buf());

    if path.is_absolute() && !has_parent_ref && path.starts_with(&root) {
        Ok(())
    } else {
        Err(WorkerError::out_of_scope(path.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "https://cdn.example.com/x.mkv\n").unwrap();
    }

    #[test]
    fn test_find_strm_files_sorted_and_recursive() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("b/Zulu.strm"));
        touch(&dir.path().join("Alpha.strm"));
        touch(&dir.path().join("a/nested/Mike.STRM"));
        touch(&dir.path().join("a/poster.jpg"));

        let files = find_strm_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["Alpha.strm", "a/nested/Mike.STRM", "b/Zulu.strm"]);
    }

    #[test]
    fn test_find_strm_files_rejects_non_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("x.strm");
        touch(&file);
        assert!(find_strm_files(&file).is_err());
    }

    #[tokio::test]
    async fn test_scan_directory() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("Movie.strm"));
        let ids = scan_directory(dir.path().to_path_buf()).await.unwrap();
        assert_eq!(ids.len(), 1);
        assert!(ids[0].ends_with("Movie.strm"));
    }

    #[tokio::test]
    async fn test_scope_checks() {
        let root = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let inside_file = root.path().join("Movie.strm");
        let outside_file = outside.path().join("Other.strm");
        touch(&inside_file);
        touch(&outside_file);

        assert!(ensure_within_root(&inside_file, root.path()).await.is_ok());
        assert!(matches!(
            ensure_within_root(&outside_file, root.path()).await,
            Err(WorkerError::OutOfScope(_))
        ));

        let canonical_root = std::fs::canonicalize(root.path()).unwrap();
        assert!(ensure_output_within_root(&canonical_root.join("thumbs/new"), root.path())
            .await
            .is_ok());
        assert!(ensure_output_within_root(&canonical_root.join("../escape"), root.path())
            .await
            .is_err());
    }
}
