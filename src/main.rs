//! Sitepipe - command-line tool for building and serving static site assets

use std::process::ExitCode;

use sitepipe::cli;

fn main() -> ExitCode {
    cli::run()
}
