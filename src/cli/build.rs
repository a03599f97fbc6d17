//! Build command implementations (clean, build)

use std::process::ExitCode;

use super::{EXIT_ERROR, EXIT_SUCCESS};
use crate::build::{ParallelStats, Pipeline};

/// Run the clean command
pub fn run_clean(pipeline: Pipeline) -> ExitCode {
    let result = pipeline.clean();
    if result.is_success() {
        println!("Cleaned {}", pipeline.context().out_dir().display());
        ExitCode::from(EXIT_SUCCESS)
    } else {
        eprintln!("Clean failed: {}", result.status);
        ExitCode::from(EXIT_ERROR)
    }
}

/// Run the build command: clean, then every stage
pub fn run_build(pipeline: &Pipeline) -> ExitCode {
    if pipeline.context().is_verbose() {
        let context = pipeline.context();
        println!("Source: {}", context.src_dir().display());
        println!("Output: {}", context.out_dir().display());
        println!("{}", ParallelStats::from_graph(pipeline.graph(), context.jobs()));
    }

    if pipeline.build().is_success() {
        ExitCode::from(EXIT_SUCCESS)
    } else {
        ExitCode::from(EXIT_ERROR)
    }
}
