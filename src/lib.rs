//! Sitepipe - static site asset pipeline
//!
//! This library provides functionality to:
//! - Resolve a project's source and output trees from `sitepipe.toml`
//! - Compile styles, render markup, bundle scripts, optimize images and copy assets
//! - Run those stages as a task graph, `clean` first and the rest in parallel
//! - Rerun single stages when their sources change
//! - Serve the output tree with live reload

pub mod build;
pub mod cli;
pub mod config;
pub mod layout;
pub mod server;
pub mod stage;
pub mod watch;
