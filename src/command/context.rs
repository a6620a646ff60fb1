//! Explicit shell context for tool invocations
//!
//! Conda commands only work after its profile script has been sourced. Rather
//! than mutating the process environment, every command carries the context
//! it must run in and the runner renders it into the script.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Activation state and environment for one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolContext {
    workdir: PathBuf,
    activation: Option<PathBuf>,
    env: BTreeMap<String, String>,
}

impl ToolContext {
    /// Context without any activation, for commands that precede the install
    pub fn bare(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            activation: None,
            env: BTreeMap::new(),
        }
    }

    /// Context that sources `profile` before every command
    pub fn activated(workdir: impl Into<PathBuf>, profile: impl Into<PathBuf>) -> Self {
        Self {
            activation: Some(profile.into()),
            ..Self::bare(workdir)
        }
    }

    /// Add an environment variable for commands run in this context
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn activation(&self) -> Option<&Path> {
        self.activation.as_deref()
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Render the full script for a command line
    pub fn script(&self, line: &str) -> String {
        match &self.activation {
            Some(profile) => format!(". {} && {}", shell_quote(&profile.display().to_string()), line),
            None => line.to_string(),
        }
    }
}

/// Quote a word for POSIX shells, leaving plain words untouched
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:+@%,".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Quote a path for POSIX shells
pub fn quote_path(path: &Path) -> String {
    shell_quote(&path.display().to_string())
}
