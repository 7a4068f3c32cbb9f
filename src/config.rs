//! Application configuration

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::errors::LinkError;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub tripwatch: TripwatchConfig,
    pub firebird: FirebirdConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TripwatchConfig {
    pub apikey: String,
    pub url: String,
    /// Poll period as a duration string, e.g. `60s`.
    #[serde(with = "humantime_serde")]
    pub poll: Duration,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FirebirdConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub path: String,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, LinkError> {
        let config = Config::builder()
            .add_source(File::from(path))
            .add_source(Environment::with_prefix("TRIPWATCH_LINK").separator("__"))
            .build()?;
        let config: AppConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), LinkError> {
        if self.tripwatch.url.is_empty() {
            return Err(config_error("tripwatch.url cannot be empty"));
        }
        if self.tripwatch.apikey.is_empty() {
            return Err(config_error("tripwatch.apikey cannot be empty"));
        }
        if self.tripwatch.poll.is_zero() {
            return Err(config_error("tripwatch.poll must be greater than zero"));
        }
        if self.firebird.host.is_empty() {
            return Err(config_error("firebird.host cannot be empty"));
        }
        if self.firebird.port == 0 {
            return Err(config_error("firebird.port cannot be zero"));
        }
        if self.firebird.path.is_empty() {
            return Err(config_error("firebird.path cannot be empty"));
        }
        Ok(())
    }
}

impl FirebirdConfig {
    /// Connection coordinates with the password hidden, for startup logs.
    pub fn redacted_dsn(&self) -> String {
        format!("SYSDBA:***@{}:{}/{}", self.host, self.port, self.path)
    }
}

fn config_error(message: &str) -> LinkError {
    LinkError::ConfigurationError {
        message: message.to_string(),
    }
}

mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(d)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
