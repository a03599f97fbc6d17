//! Watch mode: rerun the bound task when its sources change.
//!
//! A [`ChangeSource`] yields batches of changed paths; the
//! [`WatchCoordinator`] maps every batch to the set of tasks whose glob
//! matches, and runs each of those once, in task order. Full rebuilds and
//! `clean` never happen here.

use crate::build::{format_duration, Pipeline, TaskId, TaskResult};
use crate::config::WatchConfig;
use crate::layout::{AssetClass, GlobSpec, SiteLayout};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Error during watch mode
#[derive(Debug, Error)]
pub enum WatchError {
    /// Failed to initialize file watcher
    #[error("failed to initialize file watcher: {0}")]
    WatcherInit(notify::Error),
    /// Failed to add watch path
    #[error("failed to watch '{}': {source}", .path.display())]
    WatchPath { path: PathBuf, source: notify::Error },
    /// None of the bound directories exist
    #[error("nothing to watch: no source directory exists")]
    NothingToWatch,
}

/// Paths that changed within one debounce window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    pub paths: Vec<PathBuf>,
}

impl ChangeBatch {
    pub fn new(paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self { paths: paths.into_iter().map(Into::into).collect() }
    }
}

/// A lazy sequence of change batches.
pub trait ChangeSource {
    type Changes: Iterator<Item = ChangeBatch>;

    /// Start (or restart) the sequence.
    fn changes(&mut self) -> Result<Self::Changes, WatchError>;
}

/// Filesystem watcher with a debounce window.
#[derive(Debug, Clone)]
pub struct NotifySource {
    roots: Vec<PathBuf>,
    debounce: Duration,
}

impl NotifySource {
    pub fn new(roots: Vec<PathBuf>, debounce: Duration) -> Self {
        Self { roots, debounce }
    }
}

impl ChangeSource for NotifySource {
    type Changes = NotifyChanges;

    fn changes(&mut self) -> Result<NotifyChanges, WatchError> {
        let (tx, rx) = channel();
        let mut debouncer = new_debouncer(self.debounce, tx).map_err(WatchError::WatcherInit)?;

        let mut watching = 0;
        for root in &self.roots {
            if !root.is_dir() {
                tracing::warn!("not watching {}: directory does not exist", root.display());
                continue;
            }
            debouncer
                .watcher()
                .watch(root, RecursiveMode::Recursive)
                .map_err(|source| WatchError::WatchPath { path: root.clone(), source })?;
            watching += 1;
        }
        if watching == 0 {
            return Err(WatchError::NothingToWatch);
        }

        Ok(NotifyChanges { _debouncer: debouncer, rx })
    }
}

/// Batches from a running [`NotifySource`]; watching stops when dropped.
pub struct NotifyChanges {
    _debouncer: Debouncer<RecommendedWatcher>,
    rx: Receiver<DebounceEventResult>,
}

impl Iterator for NotifyChanges {
    type Item = ChangeBatch;

    fn next(&mut self) -> Option<ChangeBatch> {
        loop {
            match self.rx.recv() {
                Ok(Ok(events)) => {
                    let paths: BTreeSet<PathBuf> = events.into_iter().map(|e| e.path).collect();
                    if !paths.is_empty() {
                        return Some(ChangeBatch { paths: paths.into_iter().collect() });
                    }
                }
                // Watcher errors are not fatal
                Ok(Err(error)) => tracing::warn!("watch error: {error:?}; continuing to watch"),
                Err(_) => return None,
            }
        }
    }
}

/// Fixed list of batches, replayed from the start on every call.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    batches: Vec<ChangeBatch>,
}

impl MemorySource {
    pub fn new(batches: Vec<ChangeBatch>) -> Self {
        Self { batches }
    }
}

impl ChangeSource for MemorySource {
    type Changes = std::vec::IntoIter<ChangeBatch>;

    fn changes(&mut self) -> Result<Self::Changes, WatchError> {
        Ok(self.batches.clone().into_iter())
    }
}

/// Anything that can run a single task.
pub trait TaskRunner {
    fn run_task(&self, task: TaskId) -> TaskResult;
}

impl TaskRunner for Pipeline {
    fn run_task(&self, task: TaskId) -> TaskResult {
        Pipeline::run_task(self, task)
    }
}

/// A glob bound to the task that consumes it.
#[derive(Debug, Clone)]
pub struct WatchBinding {
    pub glob: GlobSpec,
    pub task: TaskId,
}

/// Tracks files with errors per task, to report the ones that got fixed.
#[derive(Debug, Default)]
pub struct ErrorTracker {
    files_with_errors: BTreeMap<TaskId, BTreeSet<PathBuf>>,
}

impl ErrorTracker {
    /// Create a new error tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a task result, returns files that failed last time and not now.
    pub fn update(&mut self, result: &TaskResult) -> Vec<PathBuf> {
        let current: BTreeSet<PathBuf> =
            result.diagnostics.iter().map(|d| d.file.clone()).collect();
        let previous = self.files_with_errors.insert(result.task, current).unwrap_or_default();
        let now = &self.files_with_errors[&result.task];
        previous.difference(now).cloned().collect()
    }

    /// Check if there are any tracked errors
    pub fn has_errors(&self) -> bool {
        self.files_with_errors.values().any(|files| !files.is_empty())
    }

    /// Get the number of files with errors
    pub fn error_count(&self) -> usize {
        self.files_with_errors.values().map(BTreeSet::len).sum()
    }
}

/// Counters from a finished watch loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchStats {
    /// Batches received
    pub batches: usize,
    /// Task runs started
    pub dispatched: usize,
}

/// Maps change batches to task runs.
#[derive(Debug, Clone)]
pub struct WatchCoordinator {
    bindings: Vec<WatchBinding>,
    clear_screen: bool,
}

impl WatchCoordinator {
    pub fn new(bindings: Vec<WatchBinding>) -> Self {
        Self { bindings, clear_screen: false }
    }

    /// Default bindings: each source class to the stage that reads it.
    pub fn from_layout(layout: &SiteLayout, config: &WatchConfig) -> Self {
        let bindings = layout
            .globs()
            .map(|(class, glob)| WatchBinding { glob: glob.clone(), task: task_for_class(class) })
            .collect();
        Self { bindings, clear_screen: config.clear_screen }
    }

    pub fn bindings(&self) -> &[WatchBinding] {
        &self.bindings
    }

    /// Tasks to run for a set of changed paths, deduplicated, in task order.
    pub fn tasks_for(&self, paths: &[PathBuf]) -> Vec<TaskId> {
        let tasks: BTreeSet<TaskId> = self
            .bindings
            .iter()
            .filter(|b| b.task != TaskId::Clean)
            .filter(|b| paths.iter().any(|p| b.glob.matches(p)))
            .map(|b| b.task)
            .collect();
        tasks.into_iter().collect()
    }

    /// Directories to watch: `source_root` plus any binding base outside it.
    ///
    /// Watching the root recursively picks up class directories created after startup.
    pub fn watch_roots(&self, source_root: &Path) -> Vec<PathBuf> {
        let bases: BTreeSet<PathBuf> = std::iter::once(source_root.to_path_buf())
            .chain(self.bindings.iter().map(|b| b.glob.base().to_path_buf()))
            .collect();
        bases
            .iter()
            .filter(|base| !bases.iter().any(|other| other != *base && base.starts_with(other)))
            .cloned()
            .collect()
    }

    /// Run until the source is exhausted.
    pub fn run<S, R>(&self, source: &mut S, runner: &R) -> Result<WatchStats, WatchError>
    where
        S: ChangeSource,
        R: TaskRunner + ?Sized,
    {
        let mut tracker = ErrorTracker::new();
        let mut stats = WatchStats::default();

        for batch in source.changes()? {
            stats.batches += 1;
            let tasks = self.tasks_for(&batch.paths);
            if tasks.is_empty() {
                continue;
            }

            if self.clear_screen {
                clear_screen();
            }
            for path in &batch.paths {
                tracing::info!("changed: {}", path.display());
            }

            for task in tasks {
                let start = Instant::now();
                let result = runner.run_task(task);
                stats.dispatched += 1;

                for fixed in tracker.update(&result) {
                    tracing::info!("fixed: {}", fixed.display());
                }
                let elapsed = format_duration(start.elapsed());
                if result.is_success() {
                    tracing::info!("{task} done in {elapsed}");
                } else {
                    tracing::warn!("{task} {} in {elapsed}", result.status);
                }
            }
        }

        Ok(stats)
    }
}

/// Which task consumes an asset class.
pub fn task_for_class(class: AssetClass) -> TaskId {
    match class {
        AssetClass::Styles => TaskId::Styles,
        AssetClass::Markup | AssetClass::Partials | AssetClass::Data => TaskId::Markup,
        AssetClass::Scripts => TaskId::Scripts,
        AssetClass::Images => TaskId::Images,
        AssetClass::Static => TaskId::Assets,
    }
}

/// Clear the terminal screen
fn clear_screen() {
    // ANSI escape code to clear screen and move cursor to top-left
    print!("\x1B[2J\x1B[1;1H");
}
