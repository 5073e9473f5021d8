use ::config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::AppError;

/// Seven days.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 7 * 24 * 3600;

/// Process configuration.
///
/// Sources, later ones winning: built-in defaults, an optional
/// `graphboard.toml` in the working directory, then `GRAPHBOARD_*`
/// environment variables (e.g. `GRAPHBOARD_MONGODB_URI`).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub mongodb_uri: String,
    pub mongodb_database: String,
    pub jwt_secret: String,
    pub token_ttl_secs: u64,
    pub bcrypt_cost: u32,
    /// How long a loader waits to collect keys before fetching a batch.
    pub loader_delay_ms: u64,
    /// Per-topic event buffer.
    pub event_buffer: usize,
    /// Seed demo content on startup.
    pub demo_mode: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mongodb_uri: "mongodb://localhost:27017".to_string(),
            mongodb_database: "graphboard".to_string(),
            jwt_secret: "dev-secret".to_string(),
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            loader_delay_ms: 1,
            event_buffer: 100,
            demo_mode: false,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, AppError> {
        Self::load_with(Environment::with_prefix("GRAPHBOARD"))
    }

    /// Load with an explicit environment source (useful for testing).
    pub fn load_with(environment: Environment) -> Result<Self, AppError> {
        let defaults = Self::default();

        let config = Config::builder()
            .set_default("mongodb_uri", defaults.mongodb_uri)?
            .set_default("mongodb_database", defaults.mongodb_database)?
            .set_default("jwt_secret", defaults.jwt_secret)?
            .set_default("token_ttl_secs", defaults.token_ttl_secs as i64)?
            .set_default("bcrypt_cost", i64::from(defaults.bcrypt_cost))?
            .set_default("loader_delay_ms", defaults.loader_delay_ms as i64)?
            .set_default("event_buffer", defaults.event_buffer as i64)?
            .set_default("demo_mode", defaults.demo_mode)?
            .add_source(File::with_name("graphboard").required(false))
            .add_source(environment.try_parsing(true))
            .build()?;

        let loaded: AppConfig = config.try_deserialize()?;
        if loaded.jwt_secret == "dev-secret" {
            tracing::warn!("Using the development JWT secret; set GRAPHBOARD_JWT_SECRET");
        }
        Ok(loaded)
    }
}
