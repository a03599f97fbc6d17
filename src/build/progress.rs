//! Build progress reporting.
//!
//! Tasks report what they are doing through a [`ProgressReporter`]. The
//! console reporter prints one line per event, with optional colours; the null
//! reporter discards everything and is what tests use.
//!
//! # Example
//!
//! ```ignore
//! use sitepipe::build::progress::{ConsoleProgress, ProgressEvent, ProgressReporter};
//!
//! let reporter = ConsoleProgress::new();
//! reporter.report(ProgressEvent::BuildStarted { total_tasks: 6 });
//! reporter.report(ProgressEvent::TaskStarted { task: TaskId::Styles });
//! ```

use crate::build::{BuildStatus, PipelineState, TaskId};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Events that can be reported during a build.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Build process started
    BuildStarted {
        /// Total number of tasks to run
        total_tasks: usize,
    },
    /// The pipeline moved to another state
    PhaseChanged {
        /// New state
        state: PipelineState,
    },
    /// A task started
    TaskStarted {
        /// Task identifier
        task: TaskId,
    },
    /// A task completed
    TaskCompleted {
        /// Task identifier
        task: TaskId,
        /// Final status
        status: BuildStatus,
        /// Number of files written
        outputs: usize,
        /// Duration in milliseconds
        duration_ms: u64,
    },
    /// Human-readable note emitted by a stage that finished successfully
    Notice {
        /// Task that emitted the notice
        task: TaskId,
        /// Notice text
        message: String,
    },
    /// Build process completed
    BuildCompleted {
        /// Whether the overall build succeeded
        success: bool,
        /// Total duration in milliseconds
        duration_ms: u64,
        /// Number of successful tasks
        succeeded: usize,
        /// Number of skipped tasks
        skipped: usize,
        /// Number of failed tasks
        failed: usize,
    },
    /// A warning was generated
    Warning {
        /// Task that generated the warning (if applicable)
        task: Option<TaskId>,
        /// Warning message
        message: String,
    },
    /// An error occurred
    Error {
        /// Task that generated the error (if applicable)
        task: Option<TaskId>,
        /// Error message
        message: String,
    },
}

/// Trait for progress reporters.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event.
    fn report(&self, event: ProgressEvent);

    /// Check if this reporter wants verbose output.
    fn is_verbose(&self) -> bool {
        false
    }
}

/// A progress reporter that discards all events.
#[derive(Debug, Default)]
pub struct NullProgress;

impl NullProgress {
    /// Create a new null progress reporter.
    pub fn new() -> Self {
        Self
    }
}

impl ProgressReporter for NullProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Console progress reporter with optional colors.
pub struct ConsoleProgress {
    /// Whether to use colors
    use_colors: bool,
    /// Whether to show verbose output
    verbose: bool,
    /// Completed task count
    current: AtomicUsize,
    /// Total task count
    total: AtomicUsize,
    /// Output writer (for testing)
    output: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for ConsoleProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleProgress")
            .field("use_colors", &self.use_colors)
            .field("verbose", &self.verbose)
            .field("current", &self.current)
            .field("total", &self.total)
            .finish()
    }
}

impl ConsoleProgress {
    /// Create a console reporter on stderr, coloured when stderr is a terminal.
    pub fn new() -> Self {
        Self {
            use_colors: atty::is(atty::Stream::Stderr),
            verbose: false,
            current: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            output: Mutex::new(Box::new(std::io::stderr())),
        }
    }

    /// Create a console progress reporter that writes to a custom output.
    pub fn with_output<W: Write + Send + 'static>(output: W) -> Self {
        Self {
            use_colors: false,
            verbose: false,
            current: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            output: Mutex::new(Box::new(output)),
        }
    }

    /// Set whether to use colors.
    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    /// Set verbose mode.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn color(&self, text: &str, color: &str) -> String {
        if self.use_colors {
            format!("{}{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    fn green(&self, text: &str) -> String {
        self.color(text, "\x1b[32m")
    }

    fn yellow(&self, text: &str) -> String {
        self.color(text, "\x1b[33m")
    }

    fn red(&self, text: &str) -> String {
        self.color(text, "\x1b[31m")
    }

    fn cyan(&self, text: &str) -> String {
        self.color(text, "\x1b[36m")
    }

    fn bold(&self, text: &str) -> String {
        self.color(text, "\x1b[1m")
    }

    fn writeln(&self, line: &str) {
        if let Ok(mut output) = self.output.lock() {
            let _ = writeln!(output, "{}", line);
        }
    }

    fn prefixed(&self, task: Option<TaskId>) -> String {
        match task {
            Some(task) => format!("{}: ", task),
            None => String::new(),
        }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for ConsoleProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::BuildStarted { total_tasks } => {
                self.total.store(total_tasks, Ordering::SeqCst);
                self.current.store(0, Ordering::SeqCst);
                if total_tasks > 0 {
                    self.writeln(&format!(
                        "{} Running {} task{}...",
                        self.cyan("[build]"),
                        total_tasks,
                        if total_tasks == 1 { "" } else { "s" }
                    ));
                }
            }
            ProgressEvent::PhaseChanged { state } => {
                if self.verbose {
                    self.writeln(&format!("{} {}", self.cyan("[build]"), state));
                }
            }
            ProgressEvent::TaskStarted { task } => {
                if self.verbose {
                    self.writeln(&format!("{} Starting {}...", self.cyan("[build]"), task));
                }
            }
            ProgressEvent::TaskCompleted { task, status, outputs, duration_ms } => {
                let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
                let total = self.total.load(Ordering::SeqCst).max(current);

                let status_str = match &status {
                    BuildStatus::Success => self.green("ok"),
                    BuildStatus::Skipped => self.yellow("skipped"),
                    BuildStatus::Failed(_) => self.red("FAILED"),
                };

                self.writeln(&format!(
                    "{} [{}/{}] {} {} ({} file{}, {})",
                    self.cyan("[build]"),
                    current,
                    total,
                    status_str,
                    task,
                    outputs,
                    if outputs == 1 { "" } else { "s" },
                    format_duration(Duration::from_millis(duration_ms))
                ));

                if let BuildStatus::Failed(err) = status {
                    self.writeln(&format!("        {}", self.red(&err)));
                }
            }
            ProgressEvent::Notice { task, message } => {
                self.writeln(&format!("{} {}: {}", self.green("[done]"), task, message));
            }
            ProgressEvent::BuildCompleted { success, duration_ms, succeeded, skipped, failed } => {
                let duration_str = format_duration(Duration::from_millis(duration_ms));

                if success {
                    self.writeln(&format!(
                        "\n{} {} {} finished in {}",
                        self.green("[done]"),
                        self.bold(&succeeded.to_string()),
                        if succeeded == 1 { "task" } else { "tasks" },
                        duration_str
                    ));
                } else {
                    self.writeln(&format!(
                        "\n{} Build failed: {} succeeded, {} skipped, {} {} in {}",
                        self.red("[error]"),
                        succeeded,
                        skipped,
                        failed,
                        if failed == 1 { "failure" } else { "failures" },
                        duration_str
                    ));
                }
            }
            ProgressEvent::Warning { task, message } => {
                self.writeln(&format!("{} {}{}", self.yellow("[warn]"), self.prefixed(task), message));
            }
            ProgressEvent::Error { task, message } => {
                self.writeln(&format!("{} {}{}", self.red("[error]"), self.prefixed(task), message));
            }
        }
    }

    fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Format duration for display
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}
