use anyhow::Context;
use etl_config::load_config;
use etl_config::shared::PopulatorConfig;
use etl_warehouse::registry;

/// Loads the populator configuration and validates it against the registered tables.
pub fn load_populator_config() -> anyhow::Result<PopulatorConfig> {
    let config = load_config::<PopulatorConfig>().context("failed to load configuration")?;
    config
        .validate(&registry::table_names())
        .context("invalid populator configuration")?;

    Ok(config)
}
