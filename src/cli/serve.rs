//! Long-running commands (server, watch, dev)

use std::process::ExitCode;
use std::time::Duration;

use tracing::{error, info, warn};

use super::{EXIT_ERROR, EXIT_SUCCESS};
use crate::build::{BuildContext, Pipeline};
use crate::server;
use crate::watch::{NotifySource, WatchCoordinator, WatchError, WatchStats};

/// Run the watch command: rerun stages as their sources change
pub fn run_watch(pipeline: Pipeline) -> ExitCode {
    match watch(&pipeline) {
        Ok(stats) => {
            info!("Watch ended after {} change batches", stats.batches);
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("Watch error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Run the server command: serve the output tree while watching sources
pub fn run_server(pipeline: Pipeline) -> ExitCode {
    serve(pipeline)
}

/// Run the dev command: a full build, then serve and watch
pub fn run_dev(pipeline: Pipeline) -> ExitCode {
    let result = pipeline.build();
    if !result.is_success() {
        // Failed stages are retried by the watcher once their sources change
        warn!("{}", result.summary());
    }
    serve(pipeline)
}

fn debounce(context: &BuildContext) -> Duration {
    Duration::from_millis(u64::from(context.config().watch.debounce_ms))
}

fn watch(pipeline: &Pipeline) -> Result<WatchStats, WatchError> {
    let context = pipeline.context();
    let coordinator = WatchCoordinator::from_layout(context.layout(), &context.config().watch);
    let mut source = NotifySource::new(coordinator.watch_roots(context.src_dir()), debounce(context));

    info!("Watching {} for changes (Ctrl+C to stop)", context.src_dir().display());
    coordinator.run(&mut source, pipeline)
}

fn serve(pipeline: Pipeline) -> ExitCode {
    let root = pipeline.context().out_dir().to_path_buf();
    let config = pipeline.context().config().server.clone();
    let debounce = debounce(pipeline.context());

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    // The watch loop blocks, so it gets its own thread
    let spawned = std::thread::Builder::new().name("sitepipe-watch".to_string()).spawn(move || {
        if let Err(e) = watch(&pipeline) {
            error!("watching stopped: {e}");
        }
    });
    if let Err(e) = spawned {
        eprintln!("Error: failed to start watcher: {}", e);
        return ExitCode::from(EXIT_ERROR);
    }

    match runtime.block_on(server::serve(root, &config, debounce)) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("Server error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
