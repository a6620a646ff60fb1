//! Status command - show provisioned paths and their state

use crate::cache::CacheKeyBuilder;
use crate::cli::args::KeyArgs;
use crate::cli::commands::inputs;
use crate::config::Config;
use crate::error::ProvisionResult;
use crate::history::RunLog;
use crate::provision::{EnvironmentProbe, ProvisioningState};
use console::{style, Emoji};

static CHECK: Emoji<'_, '_> = Emoji("✓ ", "[OK] ");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "[--] ");

/// Execute the status command
pub async fn execute(args: KeyArgs, config: &Config) -> ProvisionResult<()> {
    let settings = inputs::settings(config, &args);
    let layout = inputs::layout(config, &args)?;
    let probe = EnvironmentProbe::new(settings.guards, settings.packages.clone());
    let inspection = probe.inspect(&layout);

    println!("{}", style("condaprov status").bold().cyan());
    println!();

    println!("{}", style("Paths:").bold());
    for path in layout.cache_paths().iter() {
        let mark = if path.exists() { CHECK } else { CROSS };
        println!("  {}{}", mark, path.display());
    }

    println!();
    println!("{}", style("State:").bold());
    let state = match inspection.state {
        ProvisioningState::PackagesInstalled => style(inspection.state.to_string()).green(),
        ProvisioningState::Absent => style(inspection.state.to_string()).red(),
        _ => style(inspection.state.to_string()).yellow(),
    };
    println!("  Provisioning: {}", state);
    println!("  Guard policy: {:?}", probe.policy());
    println!(
        "  Package dir registered: {}",
        if inspection.pkgs_dir_registered { "yes" } else { "no" }
    );

    println!();
    println!("{}", style("Cache:").bold());
    if settings.cache_enabled() {
        match CacheKeyBuilder::new(&settings.namespace).build(
            &settings.tool_version,
            &settings.os_id,
            &settings.generation,
        ) {
            Ok(key) => println!("  {}Key: {}", CHECK, key),
            Err(e) => println!("  {}{}", CROSS, style(e).red()),
        }
        println!("  Backend: {:?}", config.cache.backend);
    } else {
        println!("  {}Disabled (no cache generation set)", CROSS);
    }

    let recent = RunLog::new(config).recent(1).await;
    if let Some(last) = recent.last() {
        println!();
        println!("{}", style("Last run:").bold());
        println!(
            "  {} at {}",
            last["event"].as_str().unwrap_or("unknown"),
            last["timestamp"].as_str().unwrap_or("unknown")
        );
    }

    Ok(())
}
