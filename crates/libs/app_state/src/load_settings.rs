use crate::{AppSettings, RawSettings};
use color_eyre::eyre::{Context, Result};
use std::path::Path;
use tracing::info;

pub const DEFAULT_SETTINGS_PATH: &str = "config/settings.yaml";

/// Loads `config/settings.yaml`, overridden by `APP__SECTION__KEY` environment variables.
pub fn load_app_settings() -> Result<AppSettings> {
    load_app_settings_from(Path::new(DEFAULT_SETTINGS_PATH))
}

pub fn load_app_settings_from(path: &Path) -> Result<AppSettings> {
    // Load .env first so it can override values like the database url.
    dotenv::from_path(".env").ok();
    let config_path = path
        .canonicalize()
        .wrap_err_with(|| format!("Cannot find settings file {}", path.display()))?;

    let builder = config::Config::builder()
        .add_source(config::File::from(config_path.clone()))
        .add_source(
            config::Environment::with_prefix("APP")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("api.allowed_origins")
                .with_list_parse_key("listener.events")
                .try_parsing(true),
        );

    let raw_settings = builder.build()?.try_deserialize::<RawSettings>()?;
    let settings = AppSettings::try_from(raw_settings)?;

    info!("Loaded settings from {}", config_path.display());

    Ok(settings)
}
