//! UI context for detecting interactive vs CI environments

use std::fmt;
use std::io::IsTerminal;

/// UI context that determines output behavior
#[derive(Debug, Clone)]
pub struct UiContext {
    /// Whether running in an interactive terminal
    interactive: bool,
    /// Whether GitHub Actions workflow commands should be emitted
    github_actions: bool,
    /// Whether human-readable output goes to stderr
    to_stderr: bool,
}

impl UiContext {
    /// Detect the current environment
    pub fn detect() -> Self {
        Self {
            interactive: Self::detect_interactive(),
            github_actions: std::env::var("GITHUB_ACTIONS").is_ok_and(|v| v == "true"),
            to_stderr: false,
        }
    }

    /// Create a non-interactive context (for testing or explicit CI mode)
    pub fn non_interactive() -> Self {
        Self {
            interactive: false,
            github_actions: false,
            to_stderr: false,
        }
    }

    /// Keep stdout for machine-readable output: plain lines, all on stderr
    pub fn on_stderr(mut self) -> Self {
        self.interactive = false;
        self.to_stderr = true;
        self
    }

    /// Force GitHub Actions log groups and annotations on or off
    pub fn with_github_actions(mut self, enabled: bool) -> Self {
        self.github_actions = enabled;
        self
    }

    /// Check if we're in an interactive terminal
    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Check if workflow commands (`::group::`, `::warning::`) should be printed
    pub fn github_actions(&self) -> bool {
        self.github_actions
    }

    /// Check if we should use fancy output (spinners, colors)
    pub fn use_fancy_output(&self) -> bool {
        self.interactive
    }

    /// Check if human-readable output is written to stderr
    pub fn writes_to_stderr(&self) -> bool {
        self.to_stderr
    }

    /// Print one plain output line to the configured stream
    pub fn print(&self, line: impl fmt::Display) {
        if self.to_stderr {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }

    /// Detect if running in an interactive environment
    fn detect_interactive() -> bool {
        // Not interactive if stdout is not a TTY
        if !std::io::stdout().is_terminal() {
            return false;
        }

        // Check for CI environment variables
        if std::env::var("CI").is_ok() {
            return false;
        }

        // Common CI environment indicators
        let ci_vars = [
            "GITHUB_ACTIONS",
            "GITLAB_CI",
            "CIRCLECI",
            "TRAVIS",
            "JENKINS_URL",
            "BUILDKITE",
            "TEAMCITY_VERSION",
            "TF_BUILD",
        ];

        for var in ci_vars {
            if std::env::var(var).is_ok() {
                return false;
            }
        }

        true
    }
}
