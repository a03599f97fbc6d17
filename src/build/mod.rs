//! Build pipeline module for sitepipe
//!
//! Provides the task graph and the orchestrator that turns a source tree into
//! a publishable output tree.
//!
//! # Overview
//!
//! The build pipeline consists of:
//! - **Discovery**: Find source files using the glob of each asset class
//! - **Planning**: A validated task graph, `clean` before every stage
//! - **Execution**: Run each dependency level on a pool of worker threads
//!
//! # Example
//!
//! ```ignore
//! use sitepipe::build::{BuildContext, Pipeline};
//! use sitepipe::config::load_config;
//!
//! let config = load_config(None)?;
//! let context = BuildContext::new(config, project_root)?;
//! let result = Pipeline::new(context).build();
//! println!("{}", result.summary());
//! ```

pub mod clean;
pub mod context;
pub mod discovery;
pub mod parallel;
pub mod pipeline;
pub mod progress;
pub mod result;
pub mod task;

pub use clean::*;
pub use context::*;
pub use discovery::*;
pub use parallel::*;
pub use pipeline::*;
pub use progress::*;
pub use result::*;
pub use task::*;
