//! Build pipeline orchestration.
//!
//! Runs the task graph level by level: `clean` first, then every transform
//! stage on a pool of worker threads. A failing stage never cancels its
//! siblings; anything that depends on a failed task is reported as skipped.

use crate::build::{
    clean_output, execute_level, BuildContext, BuildResult, NullProgress,
    ParallelStats, ProgressEvent, ProgressReporter, TaskGraph, TaskId, TaskResult,
};
use crate::stage::{run_stage, standard_stages, Stage};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// What the pipeline is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Cleaning,
    Building,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Cleaning => "cleaning",
            PipelineState::Building => "building",
        };
        f.write_str(name)
    }
}

/// Site build pipeline.
pub struct Pipeline {
    context: BuildContext,
    graph: TaskGraph,
    stages: Vec<Box<dyn Stage>>,
    progress: Arc<dyn ProgressReporter>,
    jobs: usize,
    state: Mutex<PipelineState>,
}

impl Pipeline {
    /// Standard pipeline: the site graph with the five configured stages.
    pub fn new(context: BuildContext) -> Self {
        let stages = standard_stages(context.config());
        let jobs = context.jobs();
        Self {
            context,
            graph: TaskGraph::site(),
            stages,
            progress: Arc::new(NullProgress::new()),
            jobs,
            state: Mutex::new(PipelineState::Idle),
        }
    }

    /// Use a different task graph.
    pub fn with_graph(mut self, graph: TaskGraph) -> Self {
        self.graph = graph;
        self
    }

    /// Replace the stages; tasks without a stage fail when run.
    pub fn with_stages(mut self, stages: Vec<Box<dyn Stage>>) -> Self {
        self.stages = stages;
        self
    }

    /// Set the progress reporter.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Set the number of parallel jobs.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn context(&self) -> &BuildContext {
        &self.context
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Current state.
    pub fn state(&self) -> PipelineState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: PipelineState) {
        let mut current = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *current != state {
            *current = state;
            drop(current);
            self.progress.report(ProgressEvent::PhaseChanged { state });
        }
    }

    /// Run the whole graph.
    pub fn build(&self) -> BuildResult {
        let start = Instant::now();
        self.progress.report(ProgressEvent::BuildStarted { total_tasks: self.graph.len() });

        if self.context.is_verbose() {
            let stats = ParallelStats::from_graph(&self.graph, self.jobs);
            tracing::debug!("parallel build: {stats}");
        }

        let mut result = BuildResult::new();
        let mut blocked: BTreeSet<TaskId> = BTreeSet::new();

        for level in self.graph.levels() {
            let mut runnable = Vec::with_capacity(level.len());
            for id in level {
                let failed_dep = self
                    .graph
                    .task(id)
                    .and_then(|t| t.dependencies.iter().find(|d| blocked.contains(d)).copied());
                match failed_dep {
                    Some(dep) => {
                        blocked.insert(id);
                        let skipped = TaskResult::skipped(id, format!("dependency '{dep}' failed"));
                        self.report_completed(&skipped);
                        result.add_result(skipped);
                    }
                    None => runnable.push(id),
                }
            }

            if runnable.is_empty() {
                continue;
            }
            let state = if runnable.contains(&TaskId::Clean) {
                PipelineState::Cleaning
            } else {
                PipelineState::Building
            };
            self.set_state(state);

            for task_result in execute_level(&runnable, self.jobs, |id| self.execute(*id)) {
                if !task_result.is_success() {
                    blocked.insert(task_result.task);
                }
                result.add_result(task_result);
            }
        }

        self.set_state(PipelineState::Idle);

        for path in result.overlapping_outputs() {
            self.progress.report(ProgressEvent::Warning {
                task: None,
                message: format!("'{}' was written by more than one task", path.display()),
            });
        }

        let result = result.with_duration(start.elapsed());
        self.progress.report(ProgressEvent::BuildCompleted {
            success: result.is_success(),
            duration_ms: result.total_duration.as_millis() as u64,
            succeeded: result.success_count(),
            skipped: result.skipped_count(),
            failed: result.failed_count(),
        });
        result
    }

    /// Run only the clean task.
    pub fn clean(&self) -> TaskResult {
        self.set_state(PipelineState::Cleaning);
        let result = self.execute(TaskId::Clean);
        self.set_state(PipelineState::Idle);
        result
    }

    /// Run a single task without its dependencies.
    pub fn run_task(&self, id: TaskId) -> TaskResult {
        if id == TaskId::Clean {
            return self.clean();
        }
        self.set_state(PipelineState::Building);
        let result = self.execute(id);
        self.set_state(PipelineState::Idle);
        result
    }

    /// Run one task, reporting start and completion.
    fn execute(&self, id: TaskId) -> TaskResult {
        self.progress.report(ProgressEvent::TaskStarted { task: id });

        let result = match id {
            TaskId::Clean => self.run_clean(),
            _ => match self.stages.iter().find(|s| s.task() == id) {
                Some(stage) => {
                    let result = run_stage(stage.as_ref(), &self.context);
                    if result.is_success() {
                        self.progress.report(ProgressEvent::Notice {
                            task: id,
                            message: stage.notice().to_string(),
                        });
                    }
                    result
                }
                None => TaskResult::failed(
                    id,
                    format!("no stage registered for '{id}'"),
                    std::time::Duration::ZERO,
                ),
            },
        };

        for warning in &result.warnings {
            self.progress.report(ProgressEvent::Warning { task: Some(id), message: warning.clone() });
        }
        for diagnostic in &result.diagnostics {
            self.progress
                .report(ProgressEvent::Error { task: Some(id), message: diagnostic.to_string() });
        }
        self.report_completed(&result);
        result
    }

    fn run_clean(&self) -> TaskResult {
        let start = Instant::now();
        match clean_output(self.context.out_dir()) {
            Ok(removed) => {
                tracing::debug!(removed, "cleaned {}", self.context.out_dir().display());
                TaskResult::success(TaskId::Clean, vec![], start.elapsed())
            }
            Err(e) => TaskResult::failed(TaskId::Clean, e.to_string(), start.elapsed()),
        }
    }

    fn report_completed(&self, result: &TaskResult) {
        self.progress.report(ProgressEvent::TaskCompleted {
            task: result.task,
            status: result.status.clone(),
            outputs: result.outputs.len(),
            duration_ms: result.duration.as_millis() as u64,
        });
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("graph", &self.graph)
            .field("stages", &self.stages.len())
            .field("jobs", &self.jobs)
            .field("state", &self.state())
            .finish()
    }
}
