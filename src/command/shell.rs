//! Shell command runner on tokio processes

use crate::command::context::ToolContext;
use crate::command::runner::{CommandOutput, CommandRunner, ShellCommand};
use crate::error::{ProvisionError, ProvisionResult};
use crate::ui::{self, UiContext};
use async_trait::async_trait;
use console::style;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

/// Runs command lines through `bash -c`, streaming output as it arrives
pub struct ShellRunner {
    shell: String,
    echo: bool,
    ui: UiContext,
}

impl ShellRunner {
    /// Create a runner that echoes command output through the UI
    pub fn new(ui: UiContext) -> Self {
        Self {
            shell: "bash".to_string(),
            echo: true,
            ui,
        }
    }

    /// Use a different shell binary
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Capture output without echoing it
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, context: &ToolContext, command: &ShellCommand) -> ProvisionResult<CommandOutput> {
        let script = context.script(&command.line);
        debug!("Executing: {} -c {:?}", self.shell, script);

        if self.echo {
            if let Some(label) = &command.label {
                ui::group_start(&self.ui, label);
            }
            ui::remark(&self.ui, &format!("$ {}", command.line));
        }

        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(&script)
            .current_dir(context.workdir())
            .envs(context.env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ProvisionError::spawn(command.display_name(), e))?;

        let echo = self.echo;
        let ui = &self.ui;
        let (stdout, stderr) = stream_child_output(&mut child, &|line: String| {
            if echo {
                ui.print(format_args!("    {}", style(line).dim()));
            }
        })
        .await;

        let status = child
            .wait()
            .await
            .map_err(|e| ProvisionError::spawn(command.display_name(), e))?;

        if self.echo && command.label.is_some() {
            ui::group_end(&self.ui);
        }

        Ok(CommandOutput {
            code: status.code(),
            stdout: stdout.join("\n"),
            stderr: stderr.join("\n"),
        })
    }
}

/// Stream stdout+stderr from a child process, calling `on_output` for each line.
///
/// Returns the collected (stdout, stderr) lines. Lines are read as raw bytes
/// and decoded lossily, so a pipe is only abandoned at EOF or on an IO error.
/// This is a standalone async function (not behind `async_trait`) to avoid
/// lifetime issues with the `dyn Fn` callback.
async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: &(dyn Fn(String) + Send + Sync),
) -> (Vec<String>, Vec<String>) {
    let mut stdout_lines = Vec::new();
    let mut stderr_lines = Vec::new();

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return (stdout_lines, stderr_lines);
    };

    let mut stdout_reader = BufReader::new(stdout);
    let mut stderr_reader = BufReader::new(stderr);
    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();

    let mut stdout_done = false;
    let mut stderr_done = false;

    while !stderr_done || !stdout_done {
        tokio::select! {
            read = stderr_reader.read_until(b'\n', &mut stderr_buf), if !stderr_done => {
                match read {
                    Ok(0) | Err(_) => stderr_done = true,
                    Ok(_) => {
                        let line = decode_line(&stderr_buf);
                        stderr_buf.clear();
                        on_output(line.clone());
                        stderr_lines.push(line);
                    }
                }
            }
            read = stdout_reader.read_until(b'\n', &mut stdout_buf), if !stdout_done => {
                match read {
                    Ok(0) | Err(_) => stdout_done = true,
                    Ok(_) => {
                        let line = decode_line(&stdout_buf);
                        stdout_buf.clear();
                        on_output(line.clone());
                        stdout_lines.push(line);
                    }
                }
            }
        }
    }

    (stdout_lines, stderr_lines)
}

/// Decode one raw output line, dropping the line terminator
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
