//! Provision command - restore, install and cache the conda environment

use crate::cache::format_bytes;
use crate::cli::args::ProvisionArgs;
use crate::cli::commands::inputs;
use crate::command::ShellRunner;
use crate::config::{CacheBackend, Config};
use crate::error::ProvisionResult;
use crate::history::RunLog;
use crate::provision::{
    DiagnosticsStatus, ProvisionReport, Provisioner, RestoreStatus, SaveStatus,
};
use crate::ui::{self, UiContext};
use std::sync::Arc;
use tracing::debug;

/// Execute the provision command
pub async fn execute(args: ProvisionArgs, config: &Config) -> ProvisionResult<()> {
    let ctx = ui_context(&args);
    let config = apply_overrides(&args, config);

    let settings = inputs::settings(&config, &args.key);
    let layout = inputs::layout(&config, &args.key)?;
    let cache_enabled = settings.cache_enabled();

    ui::intro(&ctx, "condaprov");
    ui::key_value(&ctx, "Distribution", &layout.distribution_root.display().to_string());
    ui::key_value(&ctx, "Environment", &layout.env_dir.display().to_string());

    let runner = ShellRunner::new(ctx.clone()).with_shell(config.provision.shell.clone());
    let mut provisioner = Provisioner::new(settings, layout, Arc::new(runner)).with_ui(ctx.clone());
    if cache_enabled {
        provisioner = provisioner.with_cache(inputs::cache_backend(&config.cache)?);
    } else {
        debug!("No cache generation set, caching disabled");
    }

    let run_log = RunLog::new(&config);
    match provisioner.run().await {
        Ok(report) => {
            run_log.record_success(&report).await;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_summary(&ctx, &report);
            }
            ui::outro_success(&ctx, "Conda environment ready");
            Ok(())
        }
        Err(e) => {
            run_log.record_failure(&e).await;
            ui::outro_error(&ctx, "Provisioning failed");
            Err(e)
        }
    }
}

/// With `--json`, stdout carries only the report
fn ui_context(args: &ProvisionArgs) -> UiContext {
    let ctx = UiContext::detect();
    if args.json {
        ctx.on_stderr()
    } else {
        ctx
    }
}

fn apply_overrides(args: &ProvisionArgs, config: &Config) -> Config {
    let mut config = config.clone();
    if let Some(url) = &args.installer_url {
        config.conda.installer_url = url.clone();
    }
    if let Some(dir) = &args.cache_dir {
        config.cache.backend = CacheBackend::Directory;
        config.cache.directory = dir.display().to_string();
    }
    if let Some(url) = &args.cache_url {
        config.cache.backend = CacheBackend::Http;
        config.cache.url = Some(url.clone());
    }
    config
}

fn print_summary(ctx: &UiContext, report: &ProvisionReport) {
    ui::section(ctx, "Summary");

    match &report.key {
        Some(key) => ui::key_value(ctx, "Cache key", key.as_str()),
        None => ui::key_value(ctx, "Cache key", "(caching disabled)"),
    }

    let restore = match &report.restore {
        RestoreStatus::Disabled => ("disabled".to_string(), true),
        RestoreStatus::Hit { key } => (format!("hit ({})", key), true),
        RestoreStatus::Miss => ("miss".to_string(), true),
        RestoreStatus::Failed { reason } => (format!("failed: {}", reason), false),
    };
    ui::key_value_status(ctx, "Restore", &restore.0, restore.1);

    let performed = if report.installed_anything() {
        let labels: Vec<&str> = report.performed.iter().map(|s| s.label()).collect();
        labels.join(", ")
    } else {
        "nothing, environment already complete".to_string()
    };
    ui::key_value(ctx, "Performed", &performed);

    if let DiagnosticsStatus::Failed { reason } = &report.diagnostics {
        ui::key_value_status(ctx, "conda info", reason, false);
    }

    let save = match &report.save {
        SaveStatus::Disabled => ("disabled".to_string(), true),
        SaveStatus::Saved { receipt } if receipt.reused => {
            ("already stored".to_string(), true)
        }
        SaveStatus::Saved { receipt } => (
            format!("{} ({})", receipt.id, format_bytes(receipt.size_bytes)),
            true,
        ),
        SaveStatus::Failed { reason } => (format!("failed: {}", reason), false),
    };
    ui::key_value_status(ctx, "Save", &save.0, save.1);
    ui::key_value(ctx, "State", &report.final_state.to_string());
}
