//! Output tree cleaning.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error while cleaning the output tree.
#[derive(Debug, Error)]
pub enum CleanError {
    #[error("failed to remove '{}': {source}", .path.display())]
    Remove { path: PathBuf, source: io::Error },
    #[error("failed to prepare output root '{}': {source}", .path.display())]
    Prepare { path: PathBuf, source: io::Error },
    #[error("output root '{}' is not a directory", .0.display())]
    NotADirectory(PathBuf),
}

/// Remove everything under `root`, keeping (or creating) the root directory.
///
/// The root itself survives so a dev server or watcher holding it keeps
/// working. Returns the number of top-level entries removed.
pub fn clean_output(root: &Path) -> Result<usize, CleanError> {
    if !root.exists() {
        fs::create_dir_all(root)
            .map_err(|source| CleanError::Prepare { path: root.to_path_buf(), source })?;
        return Ok(0);
    }
    if !root.is_dir() {
        return Err(CleanError::NotADirectory(root.to_path_buf()));
    }

    let entries =
        fs::read_dir(root).map_err(|source| CleanError::Prepare { path: root.to_path_buf(), source })?;

    let mut removed = 0;
    for entry in entries {
        let entry =
            entry.map_err(|source| CleanError::Prepare { path: root.to_path_buf(), source })?;
        let path = entry.path();
        // symlink_metadata: a link to a directory is removed, never followed
        let is_dir = fs::symlink_metadata(&path).map(|m| m.is_dir()).unwrap_or(false);
        let result = if is_dir { fs::remove_dir_all(&path) } else { fs::remove_file(&path) };
        match result {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(CleanError::Remove { path, source }),
        }
    }

    Ok(removed)
}
