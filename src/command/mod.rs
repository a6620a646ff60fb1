//! Command execution for provisioning steps
//!
//! Every command runs inside an explicit `ToolContext` instead of relying on
//! ambient shell state.

mod context;
mod runner;
mod shell;

pub use context::{quote_path, shell_quote, ToolContext};
pub use runner::{CommandOutput, CommandRunner, ShellCommand};
pub use shell::ShellRunner;
