//! Task definitions and the task graph.
//!
//! A task is one named unit of work (cleaning the output tree or running one
//! transform stage). Tasks form a directed acyclic graph with typed
//! dependency edges; the graph is validated when it is built.

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Identity of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskId {
    /// Empty the output tree
    Clean,
    /// Style Compilation
    Styles,
    /// Markup Rendering
    Markup,
    /// Script Bundling
    Scripts,
    /// Image Optimization
    Images,
    /// Asset Copy
    Assets,
}

impl TaskId {
    /// The five transform stages, in reporting order.
    pub const STAGES: [TaskId; 5] =
        [TaskId::Styles, TaskId::Markup, TaskId::Scripts, TaskId::Images, TaskId::Assets];

    /// Task name as used in logs and progress output.
    pub fn name(&self) -> &'static str {
        match self {
            TaskId::Clean => "clean",
            TaskId::Styles => "styles",
            TaskId::Markup => "markup",
            TaskId::Scripts => "scripts",
            TaskId::Images => "images",
            TaskId::Assets => "assets",
        }
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A node in the task graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Task identity
    pub id: TaskId,
    /// Tasks that must complete before this one starts
    pub dependencies: Vec<TaskId>,
}

impl Task {
    /// Create a task with no dependencies.
    pub fn new(id: TaskId) -> Self {
        Self { id, dependencies: vec![] }
    }

    /// Add a dependency to this task.
    pub fn after(mut self, dep: TaskId) -> Self {
        if !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
        self
    }
}

/// Error while building the task graph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// Circular dependency detected
    #[error("circular dependency detected involving task '{0}'")]
    CyclicDependency(TaskId),
    /// An edge points at a task that is not in the graph
    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: TaskId, dependency: TaskId },
    /// The same task was added twice
    #[error("task '{0}' is defined more than once")]
    DuplicateTask(TaskId),
}

/// A validated directed acyclic graph of tasks.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    /// Tasks in insertion order
    tasks: Vec<Task>,
    /// Topological order, computed once at construction
    order: Vec<TaskId>,
}

impl TaskGraph {
    /// Build a graph, rejecting duplicates, dangling edges and cycles.
    pub fn new(tasks: Vec<Task>) -> Result<Self, GraphError> {
        let mut seen = BTreeSet::new();
        for task in &tasks {
            if !seen.insert(task.id) {
                return Err(GraphError::DuplicateTask(task.id));
            }
        }
        for task in &tasks {
            if let Some(dep) = task.dependencies.iter().find(|d| !seen.contains(d)) {
                return Err(GraphError::UnknownDependency { task: task.id, dependency: *dep });
            }
        }

        let mut graph = Self { tasks, order: vec![] };
        graph.order = graph.topological_order()?;
        Ok(graph)
    }

    /// The standard site build: `clean`, then every stage in parallel.
    pub fn site() -> Self {
        let mut tasks = vec![Task::new(TaskId::Clean)];
        tasks.extend(TaskId::STAGES.into_iter().map(|id| Task::new(id).after(TaskId::Clean)));
        // The standard graph is a star rooted at clean and cannot be cyclic.
        let order = std::iter::once(TaskId::Clean).chain(TaskId::STAGES).collect();
        Self { tasks, order }
    }

    /// Get all tasks in insertion order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Look up one task.
    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Check whether the graph contains a task.
    pub fn contains(&self, id: TaskId) -> bool {
        self.task(id).is_some()
    }

    /// Get the number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks sorted so that dependencies come before dependents.
    pub fn order(&self) -> &[TaskId] {
        &self.order
    }

    /// A copy of the graph without the given task and the edges into it.
    pub fn without(&self, id: TaskId) -> Self {
        let tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| t.id != id)
            .map(|t| Task {
                id: t.id,
                dependencies: t.dependencies.iter().copied().filter(|d| *d != id).collect(),
            })
            .collect();
        let order = self.order.iter().copied().filter(|t| *t != id).collect();
        Self { tasks, order }
    }

    /// Group tasks into levels; every dependency of a task sits in an earlier level.
    pub fn levels(&self) -> Vec<Vec<TaskId>> {
        let mut depth: BTreeMap<TaskId, usize> = BTreeMap::new();

        // Topological order guarantees dependencies are assigned first
        for id in &self.order {
            let level = self
                .task(*id)
                .and_then(|t| t.dependencies.iter().filter_map(|d| depth.get(d)).map(|l| l + 1).max())
                .unwrap_or(0);
            depth.insert(*id, level);
        }

        let max_level = match depth.values().copied().max() {
            Some(max) => max,
            None => return vec![],
        };
        let mut levels: Vec<Vec<TaskId>> = vec![Vec::new(); max_level + 1];
        for task in &self.tasks {
            if let Some(&level) = depth.get(&task.id) {
                levels[level].push(task.id);
            }
        }
        levels
    }

    fn topological_order(&self) -> Result<Vec<TaskId>, GraphError> {
        let mut result = Vec::new();
        let mut visited = BTreeSet::new();
        let mut visiting = BTreeSet::new();

        for task in &self.tasks {
            self.visit(task, &mut visited, &mut visiting, &mut result)?;
        }

        Ok(result)
    }

    fn visit(
        &self,
        task: &Task,
        visited: &mut BTreeSet<TaskId>,
        visiting: &mut BTreeSet<TaskId>,
        result: &mut Vec<TaskId>,
    ) -> Result<(), GraphError> {
        if visited.contains(&task.id) {
            return Ok(());
        }

        if !visiting.insert(task.id) {
            return Err(GraphError::CyclicDependency(task.id));
        }

        for dep_id in &task.dependencies {
            if let Some(dep) = self.task(*dep_id) {
                self.visit(dep, visited, visiting, result)?;
            }
        }

        visiting.remove(&task.id);
        visited.insert(task.id);
        result.push(task.id);

        Ok(())
    }
}
