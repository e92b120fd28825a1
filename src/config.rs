//! Runtime configuration from the environment (and `.env` if present).

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use chrono_tz::Tz;
use thiserror::Error;

pub const ENV_DATA_DIR: &str = "PLANNING_DATA_DIR";
pub const ENV_BIND: &str = "PLANNING_BIND";
pub const ENV_SYNC_INTERVAL: &str = "PLANNING_SYNC_INTERVAL_SECS";
pub const ENV_FETCH_TIMEOUT: &str = "PLANNING_FETCH_TIMEOUT_SECS";
pub const ENV_TIMEZONE: &str = "PLANNING_TIMEZONE";

#[derive(Debug, Error)]
#[error("invalid {key}={value:?}: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub sync_interval: Duration,
    pub fetch_timeout: Duration,
    pub timezone: Tz, // "local" for the 10:00 / 17:00 pins
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            sync_interval: Duration::from_secs(30 * 60),
            fetch_timeout: Duration::from_secs(30),
            timezone: chrono_tz::Europe::Paris,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // a missing .env is fine
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|d| !d.trim().is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(v) = lookup(ENV_BIND) {
            config.bind_addr = parse(ENV_BIND, &v)?;
        }
        if let Some(v) = lookup(ENV_SYNC_INTERVAL) {
            config.sync_interval = Duration::from_secs(parse_positive(ENV_SYNC_INTERVAL, &v)?);
        }
        if let Some(v) = lookup(ENV_FETCH_TIMEOUT) {
            config.fetch_timeout = Duration::from_secs(parse_positive(ENV_FETCH_TIMEOUT, &v)?);
        }
        if let Some(v) = lookup(ENV_TIMEZONE) {
            config.timezone = parse(ENV_TIMEZONE, &v)?;
        }

        Ok(config)
    }
}

fn parse<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_positive(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    let n: u64 = parse(key, value)?;
    if n == 0 {
        return Err(ConfigError {
            key,
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(n)
}
