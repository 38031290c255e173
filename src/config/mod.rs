mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{
    ClientSettings, ConsumerSettings, HistorySettings, ResendSettings, Settings,
    StorageSettings, TelemetrySettings,
};

/// Loads the configuration from the default file and environment variables.
///
/// Environment variables use the `RELAY` prefix and `__` between section and
/// key, e.g. `RELAY_CLIENT__API_KEY`. Missing values fall back to
/// `Settings::default()`.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("RELAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}

#[cfg(test)]
mod tests;
