//! Command runner abstraction

use crate::command::context::ToolContext;
use crate::error::ProvisionResult;
use async_trait::async_trait;

/// Max number of output lines to include in step failure messages.
const ERROR_TAIL_LINES: usize = 50;

/// A shell command line with an optional display label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub line: String,
    pub label: Option<String>,
}

impl ShellCommand {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            label: None,
        }
    }

    /// Attach a label shown while the command runs
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Label if set, otherwise the command line itself
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.line)
    }
}

/// Exit status and captured output of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Exit code for reporting, -1 for signals
    pub fn exit_code(&self) -> i32 {
        self.code.unwrap_or(-1)
    }

    /// The useful tail of stdout and stderr for error diagnostics
    pub fn tail(&self) -> String {
        let lines: Vec<&str> = self.stdout.lines().chain(self.stderr.lines()).collect();
        let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
        lines[start..].join("\n")
    }
}

/// Executes shell commands to completion
///
/// Implementations return `Err` only when the command could not be started.
/// A non-zero exit is reported through `CommandOutput`.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, context: &ToolContext, command: &ShellCommand) -> ProvisionResult<CommandOutput>;
}
