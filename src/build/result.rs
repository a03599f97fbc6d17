//! Build result types.
//!
//! Contains types for representing the outcome of task runs and whole builds.

use crate::build::TaskId;
use std::path::PathBuf;
use std::time::Duration;

/// Status of a single task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    /// Task succeeded
    Success,
    /// Task did not run (a dependency failed)
    Skipped,
    /// Task failed with error
    Failed(String),
}

impl BuildStatus {
    /// Check if the status indicates success.
    pub fn is_success(&self) -> bool {
        matches!(self, BuildStatus::Success)
    }

    /// Check if the status indicates failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, BuildStatus::Failed(_))
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildStatus::Success => write!(f, "success"),
            BuildStatus::Skipped => write!(f, "skipped"),
            BuildStatus::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// A compile or data error tied to one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiagnostic {
    /// Path to the file containing the error
    pub file: PathBuf,
    /// Line number (1-indexed, None if unknown)
    pub line: Option<usize>,
    /// Column number (1-indexed, None if unknown)
    pub column: Option<usize>,
    /// Error message
    pub message: String,
}

impl FileDiagnostic {
    /// Create a diagnostic with file and message
    pub fn new(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self { file: file.into(), line: None, column: None, message: message.into() }
    }

    /// Create a diagnostic with full location information
    pub fn with_location(
        file: impl Into<PathBuf>,
        line: usize,
        column: usize,
        message: impl Into<String>,
    ) -> Self {
        Self { file: file.into(), line: Some(line), column: Some(column), message: message.into() }
    }
}

impl std::fmt::Display for FileDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.file.display())?;
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
            if let Some(col) = self.column {
                write!(f, ":{}", col)?;
            }
        }
        write!(f, ": {}", self.message)
    }
}

/// Result of running a single task.
#[derive(Debug, Clone)]
pub struct TaskResult {
    /// Task that ran
    pub task: TaskId,
    /// Build status
    pub status: BuildStatus,
    /// Output files produced
    pub outputs: Vec<PathBuf>,
    /// Task duration
    pub duration: Duration,
    /// Warning messages (if any)
    pub warnings: Vec<String>,
    /// Per-file errors; a task with any of these is failed
    pub diagnostics: Vec<FileDiagnostic>,
}

impl TaskResult {
    /// Create a successful result.
    pub fn success(task: TaskId, outputs: Vec<PathBuf>, duration: Duration) -> Self {
        Self {
            task,
            status: BuildStatus::Success,
            outputs,
            duration,
            warnings: vec![],
            diagnostics: vec![],
        }
    }

    /// Create a skipped result.
    pub fn skipped(task: TaskId, reason: impl Into<String>) -> Self {
        Self {
            task,
            status: BuildStatus::Skipped,
            outputs: vec![],
            duration: Duration::ZERO,
            warnings: vec![reason.into()],
            diagnostics: vec![],
        }
    }

    /// Create a failed result.
    pub fn failed(task: TaskId, error: String, duration: Duration) -> Self {
        Self {
            task,
            status: BuildStatus::Failed(error),
            outputs: vec![],
            duration,
            warnings: vec![],
            diagnostics: vec![],
        }
    }

    /// Add warnings to the result.
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Attach per-file diagnostics; any diagnostic turns the result into a failure.
    pub fn with_diagnostics(mut self, diagnostics: Vec<FileDiagnostic>) -> Self {
        if !diagnostics.is_empty() && !self.status.is_failure() {
            let noun = if diagnostics.len() == 1 { "file" } else { "files" };
            self.status = BuildStatus::Failed(format!("{} {} failed", diagnostics.len(), noun));
        }
        self.diagnostics = diagnostics;
        self
    }

    /// Check if this result is successful.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Result of a complete build run.
#[derive(Debug, Default)]
pub struct BuildResult {
    /// Results for each task, in completion order per level
    pub tasks: Vec<TaskResult>,
    /// Total build duration
    pub total_duration: Duration,
}

impl BuildResult {
    /// Create a new empty build result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task result.
    pub fn add_result(&mut self, result: TaskResult) {
        self.tasks.push(result);
    }

    /// Set the total duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.total_duration = duration;
        self
    }

    /// Find the result of one task.
    pub fn get(&self, task: TaskId) -> Option<&TaskResult> {
        self.tasks.iter().find(|r| r.task == task)
    }

    /// Get the number of successful tasks.
    pub fn success_count(&self) -> usize {
        self.tasks.iter().filter(|r| r.status.is_success()).count()
    }

    /// Get the number of skipped tasks.
    pub fn skipped_count(&self) -> usize {
        self.tasks.iter().filter(|r| matches!(r.status, BuildStatus::Skipped)).count()
    }

    /// Get the number of failed tasks.
    pub fn failed_count(&self) -> usize {
        self.tasks.iter().filter(|r| r.status.is_failure()).count()
    }

    /// Check if the overall build succeeded (nothing failed or skipped).
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0 && self.skipped_count() == 0
    }

    /// Get all outputs produced.
    pub fn all_outputs(&self) -> Vec<&PathBuf> {
        self.tasks.iter().flat_map(|r| r.outputs.iter()).collect()
    }

    /// Get all warnings.
    pub fn all_warnings(&self) -> Vec<&String> {
        self.tasks.iter().flat_map(|r| r.warnings.iter()).collect()
    }

    /// Get failed task results.
    pub fn failures(&self) -> Vec<&TaskResult> {
        self.tasks.iter().filter(|r| r.status.is_failure()).collect()
    }

    /// Output files written by more than one task.
    pub fn overlapping_outputs(&self) -> Vec<&PathBuf> {
        let mut seen = std::collections::HashMap::new();
        let mut overlaps = Vec::new();
        for result in &self.tasks {
            for output in &result.outputs {
                match seen.insert(output, result.task) {
                    Some(previous) if previous != result.task && !overlaps.contains(&output) => {
                        overlaps.push(output)
                    }
                    _ => {}
                }
            }
        }
        overlaps
    }

    /// Format a summary of the build result.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();

        let success = self.success_count();
        let skipped = self.skipped_count();
        let failed = self.failed_count();
        let total = self.tasks.len();

        if failed > 0 || skipped > 0 {
            lines.push(format!(
                "Build failed: {} succeeded, {} skipped, {} failed ({} total)",
                success, skipped, failed, total
            ));
            for result in self.failures() {
                lines.push(format!("  - {}: {}", result.task, result.status));
                for diagnostic in &result.diagnostics {
                    lines.push(format!("      {}", diagnostic));
                }
            }
        } else {
            lines.push(format!(
                "Build succeeded: {} tasks, {} files in {:?}",
                total,
                self.all_outputs().len(),
                self.total_duration
            ));
        }

        let warnings = self.all_warnings();
        if !warnings.is_empty() {
            lines.push(format!("Warnings ({}): ", warnings.len()));
            for warning in warnings.iter().take(5) {
                lines.push(format!("  - {}", warning));
            }
            if warnings.len() > 5 {
                lines.push(format!("  ... and {} more", warnings.len() - 5));
            }
        }

        lines.join("\n")
    }
}
