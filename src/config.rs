//! Process configuration, read once at startup.
//!
//! Call `dotenvy::dotenv()` first so a local `.env` file can fill in the
//! environment.

use std::path::PathBuf;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::HeaderValue;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_DB_FILE: &str = "data/teacherdash.db";
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173,http://localhost:3000";
pub const DEFAULT_LOG_LEVEL: &str = "info";

const PLACEHOLDER_SECRET: &str = "your-super-secret-jwt-key-change-this-in-production";
const PLACEHOLDER_PASSWORD: &str = "password123";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("PORT must be a number between 0 and 65535, got `{0}`")]
    InvalidPort(String),

    #[error("CORS_ORIGIN entry `{0}` is not a valid header value")]
    InvalidCorsOrigin(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub username: String,
    pub password: String,
    pub jwt_secret: String,
    pub port: u16,
    pub db_file: PathBuf,
    pub cors_origins: Vec<String>,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source; `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let optional = |name: &str, default: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let username = required("USER_CRED_USERNAME")?;
        let password = required("USER_CRED_PASS")?;
        let jwt_secret = required("JWT_SECRET")?;

        let port = match lookup("PORT").filter(|value| !value.trim().is_empty()) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(raw))?,
            None => DEFAULT_PORT,
        };

        let cors_origins = optional("CORS_ORIGIN", DEFAULT_CORS_ORIGIN)
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            username,
            password,
            jwt_secret,
            port,
            db_file: PathBuf::from(optional("DB_FILE", DEFAULT_DB_FILE)),
            cors_origins,
            log_level: optional("LOG_LEVEL", DEFAULT_LOG_LEVEL),
        })
    }

    pub fn warn_placeholders(&self) {
        if self.jwt_secret == PLACEHOLDER_SECRET {
            log::warn!("Using default JWT_SECRET. Change this in production!");
        }
        if self.password == PLACEHOLDER_PASSWORD {
            log::warn!("Using default password. Change this in production!");
        }
    }

    pub fn cors_layer(&self) -> Result<CorsLayer, ConfigError> {
        let origins = if self.cors_origins.iter().any(|origin| origin == "*") {
            AllowOrigin::any()
        } else {
            let origins = self
                .cors_origins
                .iter()
                .map(|origin| {
                    HeaderValue::from_str(origin)
                        .map_err(|_| ConfigError::InvalidCorsOrigin(origin.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            AllowOrigin::list(origins)
        };

        Ok(CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers([AUTHORIZATION, CONTENT_TYPE]))
    }
}
