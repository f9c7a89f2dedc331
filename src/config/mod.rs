//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! malformed. The session cookie is wrapped in `SecretString` so it never
//! shows up in logs.

pub mod secrets;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::{Error, Result};
use crate::reserve::http::DEFAULT_BASE_URL;

#[derive(Debug)]
pub struct Config {
    /// Session cookie string for the course-selection site.
    pub cookies: SecretString,
    pub base_url: String,
    /// Default delay between attempts.
    pub interval: Duration,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Optional classifier rules file.
    pub rules_path: Option<PathBuf>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            cookies: SecretString::from(required_var("SEATWATCH_COOKIES")?),
            base_url: std::env::var("SEATWATCH_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            interval: Duration::from_secs(secs_var("SEATWATCH_INTERVAL_SECS", 5)?),
            request_timeout: Duration::from_secs(secs_var("SEATWATCH_TIMEOUT_SECS", 10)?),
            rules_path: std::env::var_os("SEATWATCH_RULES").map(PathBuf::from),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::Config(format!("required environment variable {name} is not set")))
}

fn secs_var(name: &str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(0) => Err(Error::Config(format!("{name} must be at least 1"))),
            Ok(secs) => Ok(secs),
            Err(e) => Err(Error::Config(format!("{name}={raw:?} is not a number: {e}"))),
        },
    }
}
