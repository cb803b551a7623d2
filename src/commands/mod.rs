//! CLI command implementations.
//!
//! Each command is implemented in its own module.
//! Commands orchestrate the various library components to perform user tasks.

pub mod build;
pub mod diff;
pub mod models;
pub mod utils;

// Re-export main command functions
pub use build::execute_build;
pub use diff::execute_diff;
pub use models::{parse_window, BuildArgs, DiffArgs};
pub use utils::{display_version, validate_dump_file};
