//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod build;
mod serve;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use crate::build::{BuildContext, ConsoleProgress, Pipeline};
use crate::config::loader::{
    find_config, load_config, merge_cli_overrides, project_root, CliOverrides,
};

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// Sitepipe - build static site assets and serve them with live reload
#[derive(Parser)]
#[command(name = "sitepipe")]
#[command(about = "Sitepipe - compile styles, markup, scripts and images into a publishable site")]
#[command(version)]
pub struct Cli {
    /// Path to sitepipe.toml (default: searched upwards from the working directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Worker threads per build level
    #[arg(short, long, global = true)]
    pub jobs: Option<usize>,

    /// Override source directory
    #[arg(long, global = true)]
    pub src: Option<PathBuf>,

    /// Override output directory
    #[arg(long, global = true)]
    pub out: Option<PathBuf>,

    /// Override server port
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Remove everything under the output root
    Clean,

    /// Clean, then run every stage (the default)
    #[command(alias = "default")]
    Build,

    /// Serve the output tree and rebuild on source changes
    Server,

    /// Rebuild on source changes
    Watch,

    /// Clean, build, then serve and watch
    Dev,
}

/// Main entry point for the CLI
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let context = match load_context(&cli) {
        Ok(context) => context,
        Err(code) => return code,
    };

    match cli.command.unwrap_or(Commands::Build) {
        Commands::Clean => build::run_clean(pipeline(context, cli.verbose)),
        Commands::Build => build::run_build(&pipeline(context, cli.verbose)),
        Commands::Server => serve::run_server(pipeline(context, cli.verbose)),
        Commands::Watch => serve::run_watch(pipeline(context, cli.verbose)),
        Commands::Dev => serve::run_dev(pipeline(context, cli.verbose)),
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "sitepipe=debug" } else { "sitepipe=info" };
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = level.parse() {
        filter = filter.add_directive(directive);
    }
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

/// Load configuration, apply overrides and resolve the site layout.
fn load_context(cli: &Cli) -> Result<BuildContext, ExitCode> {
    let config_path = cli.config.clone().or_else(find_config);

    let mut config = match load_config(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return Err(ExitCode::from(EXIT_INVALID_ARGS));
        }
    };
    match &config_path {
        Some(path) if cli.verbose => println!("Using config: {}", path.display()),
        None if cli.verbose => println!("No sitepipe.toml found, using defaults"),
        _ => {}
    }

    let overrides = CliOverrides {
        out: cli.out.clone(),
        src: cli.src.clone(),
        port: cli.port,
        jobs: cli.jobs,
    };
    merge_cli_overrides(&mut config, &overrides);

    let root = match config_path.as_deref().and_then(project_root) {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => match std::env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                eprintln!("Error: cannot determine working directory: {}", e);
                return Err(ExitCode::from(EXIT_ERROR));
            }
        },
    };
    let root = std::fs::canonicalize(&root).unwrap_or(root);

    BuildContext::new(config, root).map(|c| c.with_verbose(cli.verbose)).map_err(|e| {
        eprintln!("Error: {}", e);
        ExitCode::from(EXIT_INVALID_ARGS)
    })
}

fn pipeline(context: BuildContext, verbose: bool) -> Pipeline {
    Pipeline::new(context).with_progress(Arc::new(ConsoleProgress::new().with_verbose(verbose)))
}
