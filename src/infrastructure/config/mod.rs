//! Layered configuration: defaults, then `smartlib.toml`, then `SMARTLIB_*`
//! environment variables (`__` separates nested keys).

use crate::domain::app_config::AppConfig;
use crate::domain::error::{AppError, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use std::path::Path;
use tracing::{info, warn};

pub const CONFIG_FILE: &str = "smartlib.toml";
pub const ENV_PREFIX: &str = "SMARTLIB_";

pub fn figment(config_file: &Path) -> Figment {
    Figment::from(Serialized::defaults(AppConfig::default()))
        .merge(Toml::file(config_file))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Extract and validate a configuration from `figment`.
pub fn load_from(figment: Figment) -> Result<AppConfig> {
    let config: AppConfig = figment.extract()?;

    let validation = config.validate();
    for warning in &validation.warnings {
        warn!("Configuration: {}", warning);
    }
    if !validation.valid {
        return Err(AppError::Config(validation.errors.join("; ")));
    }
    Ok(config)
}

/// Load `.env`, then the layered configuration.
pub fn load_config() -> Result<AppConfig> {
    if dotenvy::dotenv().is_ok() {
        info!("Loaded environment from .env");
    }
    let config = load_from(figment(Path::new(CONFIG_FILE)))?;
    info!(
        "Configuration loaded (db={}, llm={:?}/{}, llm_nlu={}, llm_sql={})",
        redact_url(&config.database.url),
        config.llm.provider,
        config.llm.model,
        config.llm.enable_llm_nlu,
        config.llm.enable_llm_sql
    );
    Ok(config)
}

/// Strip credentials from a connection url before logging it.
pub fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        _ => raw.to_string(),
    }
}
