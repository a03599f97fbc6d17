//! Build context containing configuration and resolved paths for a build.

use super::parallel::default_jobs;
use crate::config::SiteConfig;
use crate::layout::{LayoutError, SiteLayout};
use std::path::{Path, PathBuf};

/// Build context containing configuration and paths for a build operation.
///
/// The context is created once at startup and shared read-only by every task.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// The loaded configuration
    config: SiteConfig,
    /// Project root directory (where sitepipe.toml is located)
    project_root: PathBuf,
    /// Source and output trees resolved against the project root
    layout: SiteLayout,
    /// Whether to run in verbose mode
    verbose: bool,
}

impl BuildContext {
    /// Create a new build context, resolving the site layout.
    pub fn new(config: SiteConfig, project_root: PathBuf) -> Result<Self, LayoutError> {
        let layout = SiteLayout::resolve(&project_root, &config)?;
        Ok(Self { config, project_root, layout, verbose: false })
    }

    /// Get the configuration.
    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    /// Get the project root directory.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Get the resolved layout.
    pub fn layout(&self) -> &SiteLayout {
        &self.layout
    }

    /// Get the source root.
    pub fn src_dir(&self) -> &Path {
        &self.layout.source.root
    }

    /// Get the output root.
    pub fn out_dir(&self) -> &Path {
        &self.layout.output.root
    }

    /// Whether verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Set verbose mode.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Worker count for parallel levels.
    pub fn jobs(&self) -> usize {
        self.config.build.jobs.unwrap_or_else(default_jobs).max(1)
    }

    /// Resolve a path relative to the project root.
    ///
    /// If the path is absolute, returns it unchanged.
    /// If relative, joins it with the project root.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}
