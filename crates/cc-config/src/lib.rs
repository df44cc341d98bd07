//! # cc-config
//!
//! Layered settings: built-in defaults, then `.env`, then environment
//! variables prefixed `CLIPCONTEST__` (`__` separates sections, e.g.
//! `CLIPCONTEST__AUTH__JWT_SECRET`).

use std::time::Duration;

use config::{builder::DefaultState, Config, ConfigBuilder, Environment};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

pub const ENV_PREFIX: &str = "CLIPCONTEST";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub session: SessionSettings,
    pub metadata: MetadataSettings,
    pub log: LogSettings,
    pub cors: CorsSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize)]
pub struct AuthSettings {
    /// HS256 secret shared with the OAuth provider
    pub jwt_secret: SecretString,
    /// Expected `aud` claim; empty disables the check
    #[serde(default)]
    pub audience: Option<String>,
}

/// Policy for resolving the caller's profile before the access gate runs.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    pub profile_timeout_ms: u64,
    pub profile_retries: u32,
    pub retry_delay_ms: u64,
}

impl SessionSettings {
    pub fn profile_timeout(&self) -> Duration {
        Duration::from_millis(self.profile_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetadataSettings {
    pub enabled: bool,
    pub timeout_ms: u64,
}

impl MetadataSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `info,cc_api=debug`
    pub filter: String,
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsSettings {
    /// Empty allows any origin
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Settings {
    /// Loads `.env` (if any) and the process environment on top of the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                tracing::warn!(error = %err, "ignoring unreadable .env file");
            }
        }
        let builder = Self::defaults()?.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("cors.allowed_origins")
                .try_parsing(true),
        );
        Self::from_config(builder.build()?)
    }

    /// Builder pre-populated with every default value.
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Ok(Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.url", "sqlite://clip_contest.db")?
            .set_default("database.max_connections", 5)?
            .set_default("auth.audience", "authenticated")?
            .set_default("session.profile_timeout_ms", 3000)?
            .set_default("session.profile_retries", 1)?
            .set_default("session.retry_delay_ms", 200)?
            .set_default("metadata.enabled", true)?
            .set_default("metadata.timeout_ms", 4000)?
            .set_default("log.filter", "info")?
            .set_default("log.json", false)?
            .set_default("cors.allowed_origins", Vec::<String>::new())?)
    }

    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let mut settings: Settings = config.try_deserialize()?;
        if settings
            .auth
            .audience
            .as_deref()
            .is_some_and(|aud| aud.trim().is_empty())
        {
            settings.auth.audience = None;
        }
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.expose_secret().trim().is_empty() {
            return Err(ConfigError::Invalid("auth.jwt_secret must be set".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid("database.max_connections must be at least 1".into()));
        }
        if self.session.profile_timeout_ms == 0 {
            return Err(ConfigError::Invalid("session.profile_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
