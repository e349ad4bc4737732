use chrono::Duration;

use crate::auth::PasswordPolicy;
use crate::error::ConfigError;

const MIN_SECRET_LENGTH: usize = 32;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    #[serde(default)]
    pub database: Option<DatabaseSettings>,
    pub jwt: JwtSettings,
    #[serde(default)]
    pub password_policy: PasswordPolicy,
    #[serde(default)]
    pub default_user: Option<DefaultUserSettings>,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub storage: StorageBackend,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// Which adapter pair backs the credential and refresh-token stores.
#[derive(serde::Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    /// Points at the server's default database, for creating new ones.
    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// Token signing and lifetime settings.
///
/// Established once at startup and shared read-only by the issuer,
/// the validator and the authentication middleware.
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub access_token_expiry: i64,       // seconds (e.g., 900 for 15 minutes)
    pub remember_me_token_expiry: i64,  // seconds (e.g., 2592000 for 30 days)
    pub refresh_token_expiry: i64,      // seconds (e.g., 604800 for 7 days)
}

impl JwtSettings {
    pub fn access_token_lifetime(&self) -> Duration {
        Duration::seconds(self.access_token_expiry)
    }

    pub fn remember_me_lifetime(&self) -> Duration {
        Duration::seconds(self.remember_me_token_expiry)
    }

    pub fn refresh_token_lifetime(&self) -> Duration {
        Duration::seconds(self.refresh_token_expiry)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }

        for (name, value) in [
            ("jwt.access_token_expiry", self.access_token_expiry),
            ("jwt.remember_me_token_expiry", self.remember_me_token_expiry),
            ("jwt.refresh_token_expiry", self.refresh_token_expiry),
        ] {
            if value <= 0 {
                return Err(ConfigError::InvalidValue(format!("{} must be positive", name)));
            }
        }

        Ok(())
    }
}

/// Account created at startup when no user with `username` exists yet
#[derive(serde::Deserialize, Clone)]
pub struct DefaultUserSettings {
    pub username: String,
    pub password: String,
    pub email: String,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.jwt.validate()?;
        if self.application.storage == StorageBackend::Postgres && self.database.is_none() {
            return Err(ConfigError::InvalidValue(
                "database settings are required for postgres storage".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reads `configuration.{yaml,toml,json}` when present, then overrides with
/// `APP_`-prefixed environment variables (`APP_JWT__SECRET=...`).
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}
