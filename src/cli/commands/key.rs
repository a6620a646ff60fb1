//! Key command - print the cache key for the current inputs

use crate::cache::CacheKeyBuilder;
use crate::cli::args::KeyArgs;
use crate::cli::commands::inputs;
use crate::config::Config;
use crate::error::{ProvisionError, ProvisionResult};

/// Execute the key command
pub async fn execute(args: KeyArgs, config: &Config) -> ProvisionResult<()> {
    let settings = inputs::settings(config, &args);

    if !settings.cache_enabled() {
        return Err(ProvisionError::User(
            "Caching is disabled: no cache generation set (--cache-number or cache.generation)"
                .to_string(),
        ));
    }

    let key = CacheKeyBuilder::new(&settings.namespace).build(
        &settings.tool_version,
        &settings.os_id,
        &settings.generation,
    )?;
    println!("{}", key);
    Ok(())
}
