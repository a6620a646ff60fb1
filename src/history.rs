//! Run history
//!
//! Appends one JSON line per provisioning run to
//! `~/.local/state/condaprov/runs.log`. Writing is best effort and never
//! affects the run itself.

use crate::config::{Config, ConfigManager};
use crate::provision::ProvisionReport;
use chrono::Utc;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// File-based run log that appends JSON lines
pub struct RunLog {
    enabled: bool,
    path: PathBuf,
}

impl RunLog {
    /// Create a run log from config
    pub fn new(config: &Config) -> Self {
        Self {
            enabled: config.general.run_log,
            path: ConfigManager::run_log_path(),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Record a completed run
    pub async fn record_success(&self, report: &ProvisionReport) {
        let data = match serde_json::to_value(report) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to serialize run report: {}", e);
                return;
            }
        };
        self.log("provision.completed", &data).await;
    }

    /// Record a failed run
    pub async fn record_failure(&self, error: &crate::error::ProvisionError) {
        self.log(
            "provision.failed",
            &serde_json::json!({ "error": error.to_string() }),
        )
        .await;
    }

    /// Log an event as a JSON line
    pub async fn log(&self, event: &str, data: &serde_json::Value) {
        if !self.enabled {
            return;
        }

        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": event,
            "data": data,
        });

        let mut line = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize run event: {}", e);
                return;
            }
        };
        line.push('\n');

        if let Err(e) = self.append(&line).await {
            warn!("Failed to write run log: {}", e);
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Read back the most recent `limit` entries, oldest first
    pub async fn recent(&self, limit: usize) -> Vec<serde_json::Value> {
        let Ok(content) = tokio::fs::read_to_string(&self.path).await else {
            return Vec::new();
        };

        let entries: Vec<serde_json::Value> = content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        let start = entries.len().saturating_sub(limit);
        entries[start..].to_vec()
    }
}
