use crate::retry::RetryConfig;
use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub ledger: LedgerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Ledger database
    pub name: String,
    /// Database connected to when creating or dropping `name`
    pub maintenance_database: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LedgerConfig {
    /// Boundary-side retry of transactions that lost a concurrency race
    pub retry: RetryConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 1323)?
            .set_default("server.workers", 4)?
            .set_default("server.shutdown_timeout_secs", 10)?
            .set_default("database.host", "localhost")?
            .set_default("database.port", 5432)?
            .set_default("database.username", "postgres")?
            .set_default("database.password", "")?
            .set_default("database.name", "wallet")?
            .set_default("database.maintenance_database", "postgres")?
            .set_default("database.max_connections", 10)?
            .set_default("database.acquire_timeout_secs", 5)?
            .set_default("ledger.retry.max_retries", 2)?
            .set_default("ledger.retry.initial_delay_ms", 10)?
            .set_default("ledger.retry.max_delay_ms", 200)?
            .set_default("ledger.retry.backoff_multiplier", 2.0)?
            .set_default("ledger.retry.jitter_factor", 0.2)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?;

        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(File::with_name(&config_file).required(false));
        } else {
            builder = builder.add_source(
                File::with_name(&format!("config/{}", environment)).required(false),
            );
        }

        // WALLET_ENGINE__DATABASE__PASSWORD -> database.password
        builder = builder.add_source(
            Environment::with_prefix("WALLET_ENGINE")
                .prefix_separator("__")
                .separator("__"),
        );

        if let Ok(port) = env::var("PORT") {
            builder = builder.set_override("server.port", port)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        if self.server.workers == 0 {
            return Err("At least one server worker is required".to_string());
        }

        if self.database.host.is_empty() {
            return Err("Database host is required".to_string());
        }

        if self.database.name.is_empty() {
            return Err("Database name is required".to_string());
        }

        if self.database.max_connections == 0 {
            return Err("Database pool needs at least one connection".to_string());
        }

        let retry = &self.ledger.retry;
        if retry.backoff_multiplier < 1.0 {
            return Err("Retry backoff multiplier must be at least 1.0".to_string());
        }
        if !(0.0..=1.0).contains(&retry.jitter_factor) {
            return Err("Retry jitter factor must be between 0.0 and 1.0".to_string());
        }
        if retry.initial_delay_ms > retry.max_delay_ms {
            return Err("Retry initial delay cannot exceed max delay".to_string());
        }

        Ok(())
    }

    /// Copy safe to print: secrets are masked.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if !config.database.password.is_empty() {
            config.database.password = "********".to_string();
        }
        config
    }
}
