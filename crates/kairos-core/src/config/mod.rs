use anyhow::Result;
use config::Config;
use serde::Deserialize;

use crate::constants::{BOOKING_HORIZON_DAYS, DEFAULT_WORKER_CONCURRENCY, SERIES_HORIZON_DAYS};
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub engine: EngineConfig,
    pub ledger: RemoteServiceConfig,
    pub directory: RemoteServiceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// Tuning for the materialization and participation engine.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Days scanned forward when advancing a recurring series.
    pub series_horizon_days: u32,
    /// Days scanned forward when expanding an availability slot.
    pub booking_horizon_days: u32,
    /// Recurrence groups processed concurrently by one pass.
    pub worker_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            series_horizon_days: SERIES_HORIZON_DAYS,
            booking_horizon_days: BOOKING_HORIZON_DAYS,
            worker_concurrency: DEFAULT_WORKER_CONCURRENCY,
        }
    }
}

/// An HTTP collaborator (payment ledger, identity directory).
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteServiceConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl RemoteServiceConfig {
    /// ## Summary
    /// Joins a route path onto the configured base URL.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    #[must_use]
    pub const fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

impl Settings {
    /// ## Summary
    /// Loads configuration from `.env` file and environment variables into a `Settings`.
    /// Environment variables take precedence over `.env` file values.
    ///
    /// ## Errors
    /// Returns an error if building the configuration or deserializing it fails.
    pub fn load() -> Result<Self> {
        Ok(Config::builder()
            .set_default("database.max_connections", 4)?
            .set_default("logging.level", "debug")?
            .set_default("engine.series_horizon_days", i64::from(SERIES_HORIZON_DAYS))?
            .set_default("engine.booking_horizon_days", i64::from(BOOKING_HORIZON_DAYS))?
            .set_default(
                "engine.worker_concurrency",
                i64::try_from(DEFAULT_WORKER_CONCURRENCY)?,
            )?
            .set_default("ledger.timeout_secs", 10)?
            .set_default("directory.timeout_secs", 10)?
            // Environment
            .add_source(
                config::Environment::default()
                    .convert_case(config::Case::Snake)
                    .separator("_")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            // TOML file
            .add_source(config::File::with_name("config.toml").required(false))
            .build()?
            .try_deserialize::<Settings>()?)
    }

    /// ## Summary
    /// Rejects settings that deserialize but cannot drive a pass.
    ///
    /// ## Errors
    /// Returns a configuration error for a zero horizon, zero workers, an empty pool or a
    /// collaborator without a base URL.
    pub fn validate(&self) -> CoreResult<()> {
        if self.database.max_connections == 0 {
            return Err(CoreError::ConfigError(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.engine.series_horizon_days == 0 || self.engine.booking_horizon_days == 0 {
            return Err(CoreError::ConfigError(
                "engine horizons must be at least one day".to_string(),
            ));
        }
        if self.engine.worker_concurrency == 0 {
            return Err(CoreError::ConfigError(
                "engine.worker_concurrency must be at least 1".to_string(),
            ));
        }
        for (name, remote) in [("ledger", &self.ledger), ("directory", &self.directory)] {
            if remote.base_url.trim().is_empty() {
                return Err(CoreError::ConfigError(format!("{name}.base_url is not set")));
            }
        }
        Ok(())
    }
}

/// ## Summary
/// Loads configuration from environment variables and `.env` file.
///
/// ## Errors
/// Returns an error if loading, deserializing or validating the configuration fails.
pub fn load_config() -> Result<Settings> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests;
