//! Source file discovery for the build system.
//!
//! Expands a [`GlobSpec`] against the filesystem.

use crate::layout::GlobSpec;
use glob::{glob_with, MatchOptions, Pattern};
use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;

/// Error during source discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Invalid glob pattern
    #[error("Invalid glob pattern '{0}': {1}")]
    InvalidPattern(String, glob::PatternError),
    /// IO error during file enumeration
    #[error("IO error during discovery: {0}")]
    Io(#[from] std::io::Error),
}

/// Discover the files a spec matches.
///
/// Returns absolute paths, deduplicated across patterns and sorted, so the
/// same source tree always yields the same order. Directories are skipped; a
/// missing base directory simply matches nothing.
pub fn discover(spec: &GlobSpec) -> Result<Vec<PathBuf>, DiscoveryError> {
    let options = MatchOptions { require_literal_separator: true, ..MatchOptions::new() };
    let base = Pattern::escape(&spec.base().to_string_lossy());
    let mut files = BTreeSet::new();

    for pattern in spec.patterns() {
        let full_pattern = format!("{}/{}", base.trim_end_matches('/'), pattern);
        let paths = glob_with(&full_pattern, options)
            .map_err(|e| DiscoveryError::InvalidPattern(pattern.to_string(), e))?;

        for entry in paths {
            let path = entry.map_err(|e| DiscoveryError::Io(e.into_error()))?;
            if path.is_file() && spec.matches(&path) {
                files.insert(path);
            }
        }
    }

    Ok(files.into_iter().collect())
}
