//! Parallel level execution.
//!
//! Tasks are grouped into dependency levels by [`TaskGraph::levels`]; every
//! task in a level is independent of the others, so a level runs on a small
//! pool of scoped worker threads. There is no fail-fast: a failing task never
//! stops its siblings, and the caller sees every result.

use crate::build::TaskGraph;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Default number of parallel jobs (uses available parallelism).
pub fn default_jobs() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Run `work` over every item of a level using up to `jobs` workers.
///
/// Results come back in the order of `items`, regardless of which worker
/// finished first.
pub fn execute_level<T, R, F>(items: &[T], jobs: usize, work: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    if items.is_empty() {
        return vec![];
    }

    // Single worker or single item: no threads needed
    if jobs <= 1 || items.len() == 1 {
        return items.iter().map(&work).collect();
    }

    let results = Mutex::new(Vec::with_capacity(items.len()));
    let next_idx = AtomicUsize::new(0);

    std::thread::scope(|s| {
        let num_workers = jobs.min(items.len());
        for _ in 0..num_workers {
            let results = &results;
            let next_idx = &next_idx;
            let work = &work;

            s.spawn(move || loop {
                let idx = next_idx.fetch_add(1, Ordering::SeqCst);
                if idx >= items.len() {
                    break;
                }
                let result = work(&items[idx]);
                results.lock().unwrap_or_else(|e| e.into_inner()).push((idx, result));
            });
        }
    });

    // Sort results by original index to maintain deterministic order
    let mut results = results.into_inner().unwrap_or_else(|e| e.into_inner());
    results.sort_by_key(|(idx, _)| *idx);
    results.into_iter().map(|(_, r)| r).collect()
}

/// Statistics about parallel build execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParallelStats {
    /// Number of dependency levels
    pub levels: usize,
    /// Number of workers used
    pub workers: usize,
    /// Maximum tasks that can run simultaneously
    pub max_parallelism: usize,
    /// Total tasks in the graph
    pub total_tasks: usize,
}

impl ParallelStats {
    /// Compute stats for a graph run with `jobs` workers.
    pub fn from_graph(graph: &TaskGraph, jobs: usize) -> Self {
        let levels = graph.levels();
        let widest = levels.iter().map(Vec::len).max().unwrap_or(0);
        Self {
            levels: levels.len(),
            workers: jobs,
            max_parallelism: widest.min(jobs),
            total_tasks: graph.len(),
        }
    }
}

impl std::fmt::Display for ParallelStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} tasks in {} levels ({} workers, max {} parallel)",
            self.total_tasks, self.levels, self.workers, self.max_parallelism
        )
    }
}
