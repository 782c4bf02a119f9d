//! Application configuration module
//! Loads settings from the environment (and `.env` when present) and validates them

use std::env;

use crate::payments::providers::zalopay::ZaloPayConfig;
use crate::workers::reconciliation_poller::ReconciliationConfig;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// `None` when running against the in-memory store
    pub database: Option<DatabaseConfig>,
    pub logging: LoggingConfig,
    pub gateway: ZaloPayConfig,
    pub reconciliation: ReconciliationConfig,
    pub skip_externals: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64, // seconds
    pub idle_timeout: u64,       // seconds
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv::dotenv().ok();

        let skip_externals = env::var("SKIP_EXTERNALS")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let database = if skip_externals {
            None
        } else {
            Some(DatabaseConfig::from_env()?)
        };

        let gateway = ZaloPayConfig::from_env().map_err(|e| match e {
            crate::payments::PaymentError::ValidationError {
                field: Some(field), ..
            } if env::var(&field).is_err() => ConfigError::MissingVariable(field),
            crate::payments::PaymentError::ValidationError {
                field: Some(field), ..
            } => ConfigError::InvalidValue(field),
            other => ConfigError::InvalidValue(other.to_string()),
        })?;

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database,
            logging: LoggingConfig::from_env()?,
            gateway,
            reconciliation: ReconciliationConfig::from_env()?,
            skip_externals,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        if let Some(database) = &self.database {
            database.validate()?;
        }
        self.logging.validate()?;
        validate_gateway(&self.gateway)?;
        validate_reconciliation(&self.reconciliation)?;
        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: parse_or("DB_MAX_CONNECTIONS", 20)?,
            min_connections: parse_or("DB_MIN_CONNECTIONS", 2)?,
            connection_timeout: parse_or("DB_CONNECTION_TIMEOUT", 30)?,
            idle_timeout: parse_or("DB_IDLE_TIMEOUT", 600)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

fn validate_gateway(config: &ZaloPayConfig) -> Result<(), ConfigError> {
    if config.key1.is_empty() {
        return Err(ConfigError::MissingVariable("ZALOPAY_KEY1".to_string()));
    }
    if config.key2.is_empty() {
        return Err(ConfigError::MissingVariable("ZALOPAY_KEY2".to_string()));
    }
    for (name, url) in [
        ("ZALOPAY_CREATE_ENDPOINT", &config.create_endpoint),
        ("ZALOPAY_STATUS_ENDPOINT", &config.status_endpoint),
    ] {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(format!("{} must be a valid URL", name)));
        }
    }
    if config.timeout_secs == 0 {
        return Err(ConfigError::InvalidValue("ZALOPAY_TIMEOUT_SECS".to_string()));
    }
    Ok(())
}

fn validate_reconciliation(config: &ReconciliationConfig) -> Result<(), ConfigError> {
    if config.poll_interval.is_zero() {
        return Err(ConfigError::InvalidValue(
            "RECONCILE_POLL_INTERVAL_SECONDS".to_string(),
        ));
    }
    if config.max_attempts == 0 {
        return Err(ConfigError::ValidationFailed(
            "RECONCILE_MAX_ATTEMPTS must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// `default` when `name` is unset; a set but unparsable value is an error.
pub(crate) fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
