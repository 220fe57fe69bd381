//! Application configuration

use std::env;
use std::time::Duration;

/// Default number of tickets served at once
pub const DEFAULT_SERVING_CAPACITY: usize = 10;

/// Default time a reservation may stay open before it is released
pub const DEFAULT_RESERVATION_GRACE: Duration = Duration::from_secs(10 * 60);

/// Where the queue mirror is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,

    // Store
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Queue
    pub serving_capacity: usize,
    pub reservation_grace: Duration,

    // Logging
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let store_backend = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "postgres" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            _ => {
                return Err(ConfigError::Invalid(
                    "STORE_BACKEND must be either postgres or memory",
                ))
            }
        };

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        Ok(Self {
            // Server
            bind_address: match env::var("BIND_ADDRESS") {
                Ok(address) => address,
                Err(_) => {
                    let port: u16 = match env::var("PORT") {
                        Ok(port) => port
                            .parse()
                            .map_err(|_| ConfigError::Invalid("PORT must be a valid port number"))?,
                        Err(_) => 3000,
                    };
                    format!("0.0.0.0:{port}")
                }
            },

            // Store
            store_backend,
            database_url,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),

            // Queue
            serving_capacity: match env::var("SERVING_CAPACITY") {
                Ok(value) => value
                    .parse::<usize>()
                    .ok()
                    .filter(|capacity| *capacity > 0)
                    .ok_or(ConfigError::Invalid(
                        "SERVING_CAPACITY must be a positive integer",
                    ))?,
                Err(_) => DEFAULT_SERVING_CAPACITY,
            },
            reservation_grace: match env::var("RESERVATION_GRACE_SECS") {
                Ok(value) => value
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs)
                    .ok_or(ConfigError::Invalid(
                        "RESERVATION_GRACE_SECS must be a positive integer",
                    ))?,
                Err(_) => DEFAULT_RESERVATION_GRACE,
            },

            // Logging
            log_format: match env::var("LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "BIND_ADDRESS",
        "PORT",
        "STORE_BACKEND",
        "DATABASE_URL",
        "DATABASE_MAX_CONNECTIONS",
        "SERVING_CAPACITY",
        "RESERVATION_GRACE_SECS",
        "LOG_FORMAT",
    ];

    /// Helper to clear env vars before and after tests
    fn cleanup_config() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_with_database_url() {
        cleanup_config();
        env::set_var("DATABASE_URL", "postgres://test");

        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:3000");
        assert_eq!(config.store_backend, StoreBackend::Postgres);
        assert_eq!(config.database_url.as_deref(), Some("postgres://test"));
        assert_eq!(config.serving_capacity, 10);
        assert_eq!(config.reservation_grace, Duration::from_secs(600));
        assert_eq!(config.log_format, LogFormat::Pretty);

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_postgres_backend_requires_database_url() {
        cleanup_config();

        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::Missing("DATABASE_URL"))));

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_memory_backend_and_overrides() {
        cleanup_config();
        env::set_var("STORE_BACKEND", "memory");
        env::set_var("PORT", "8080");
        env::set_var("SERVING_CAPACITY", "3");
        env::set_var("RESERVATION_GRACE_SECS", "30");
        env::set_var("LOG_FORMAT", "json");

        let config = Config::from_env().unwrap();
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.serving_capacity, 3);
        assert_eq!(config.reservation_grace, Duration::from_secs(30));
        assert_eq!(config.log_format, LogFormat::Json);

        // BIND_ADDRESS wins over PORT
        env::set_var("BIND_ADDRESS", "127.0.0.1:9000");
        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:9000");

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_invalid_values_rejected() {
        cleanup_config();
        env::set_var("STORE_BACKEND", "memory");

        env::set_var("SERVING_CAPACITY", "0");
        assert!(matches!(Config::from_env(), Err(ConfigError::Invalid(_))));
        env::remove_var("SERVING_CAPACITY");

        env::set_var("RESERVATION_GRACE_SECS", "soon");
        assert!(matches!(Config::from_env(), Err(ConfigError::Invalid(_))));
        env::remove_var("RESERVATION_GRACE_SECS");

        env::set_var("PORT", "99999");
        assert!(matches!(Config::from_env(), Err(ConfigError::Invalid(_))));
        env::remove_var("PORT");

        env::set_var("STORE_BACKEND", "sqlite");
        assert!(matches!(Config::from_env(), Err(ConfigError::Invalid(_))));

        cleanup_config();
    }
}
