mod commands;
mod paths;

pub use commands::{CommandError, host_architecture, run_checked, run_checked_in};
pub use paths::{AppPaths, AppPathsError};
