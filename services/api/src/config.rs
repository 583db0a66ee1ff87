//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Settings for the place-name lookup used when a session is logged without coordinates.
#[derive(Clone, Debug)]
pub struct GeocoderConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub user_agent: String,
    /// Appended to every query, e.g. `"Suria KLCC, Malaysia"`.
    pub region: String,
    pub timeout: Duration,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub data_file: PathBuf,
    pub log_level: Level,
    pub currency: String,
    pub cors_origin: String,
    pub mapbox_token: Option<String>,
    pub geocoder: GeocoderConfig,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Unset keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Server and Storage Settings ---
        let bind_address_str = var("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let data_file = PathBuf::from(var("DATA_FILE", "ev_charging_log_my.csv"));
        if data_file.as_os_str().is_empty() {
            return Err(ConfigError::MissingVar("DATA_FILE".to_string()));
        }

        let log_level_str = var("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let currency = var("CURRENCY", "MYR");
        let cors_origin = var("CORS_ORIGIN", "http://localhost:3000");
        let mapbox_token = lookup("MAPBOX_TOKEN").filter(|t| !t.trim().is_empty());

        // --- Geocoder Settings ---
        let enabled_str = var("GEOCODER_ENABLED", "true");
        let enabled = parse_flag(&enabled_str).ok_or_else(|| {
            ConfigError::InvalidValue(
                "GEOCODER_ENABLED".to_string(),
                format!("'{}' is not a boolean", enabled_str),
            )
        })?;

        let timeout_str = var("GEOCODER_TIMEOUT_SECS", "10");
        let timeout = timeout_str
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| {
                ConfigError::InvalidValue("GEOCODER_TIMEOUT_SECS".to_string(), e.to_string())
            })?;

        let geocoder = GeocoderConfig {
            enabled,
            endpoint: var("GEOCODER_URL", "https://nominatim.openstreetmap.org/search"),
            user_agent: var("GEOCODER_USER_AGENT", "my_ev_tracker_v1"),
            region: var("GEOCODER_REGION", "Malaysia"),
            timeout,
        };

        Ok(Self {
            bind_address,
            data_file,
            log_level,
            currency,
            cors_origin,
            mapbox_token,
            geocoder,
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
