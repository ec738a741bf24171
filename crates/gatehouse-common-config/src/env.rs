//! Environment variable handling.

use std::env;
use thiserror::Error;

/// Environment variable errors.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("required environment variable not set: {var}")]
    NotSet { var: String },

    #[error("invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

/// Environment variable names.
pub mod vars {
    // Configuration
    pub const GATEHOUSE_CONFIG_PATH: &str = "GATEHOUSE_CONFIG_PATH";
    pub const GATEHOUSE_ENV: &str = "GATEHOUSE_ENV";
    pub const GATEHOUSE_DATABASE_URL: &str = "GATEHOUSE_DATABASE_URL";
    pub const GATEHOUSE_REDIS_URL: &str = "GATEHOUSE_REDIS_URL";

    // Logging
    pub const GATEHOUSE_LOG_LEVEL: &str = "GATEHOUSE_LOG_LEVEL";
    pub const RUST_LOG: &str = "RUST_LOG";
}

/// Environment configuration.
pub struct Environment {
    _guard: (),
}

impl Environment {
    /// Load `.env`, `.env.local` and `.env.<GATEHOUSE_ENV>` in that order.
    /// Missing files are skipped; variables already set are kept.
    pub fn init() -> Result<Self, EnvError> {
        let _ = dotenvy::from_filename(".env");
        let _ = dotenvy::from_filename(".env.local");

        if let Ok(name) = env::var(vars::GATEHOUSE_ENV) {
            let _ = dotenvy::from_filename(format!(".env.{}", name));
        }

        Ok(Self { _guard: () })
    }

    /// Get a required string variable.
    pub fn require(var: &str) -> Result<String, EnvError> {
        env::var(var).map_err(|_| EnvError::NotSet { var: var.to_string() })
    }

    /// Get an optional string variable.
    pub fn get(var: &str) -> Option<String> {
        env::var(var).ok()
    }

    /// Get a variable with a default value.
    pub fn get_or(var: &str, default: &str) -> String {
        env::var(var).unwrap_or_else(|_| default.to_string())
    }

    /// Get a boolean variable.
    pub fn get_bool(var: &str) -> Option<bool> {
        env::var(var)
            .ok()
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
    }

    /// Get an integer variable.
    pub fn get_int<T: std::str::FromStr>(var: &str) -> Result<Option<T>, EnvError> {
        match env::var(var) {
            Ok(v) => v.parse().map(Some).map_err(|_| EnvError::InvalidValue {
                var: var.to_string(),
                message: "expected integer".to_string(),
            }),
            Err(_) => Ok(None),
        }
    }

    /// Check if running in production mode.
    pub fn is_production() -> bool {
        env::var(vars::GATEHOUSE_ENV)
            .map(|v| v == "production")
            .unwrap_or(false)
    }
}
