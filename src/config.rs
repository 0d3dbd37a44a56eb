//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `CARD_SECRET` (required): deployment secret the at-rest encryption
///   key is derived from; minimum 8 characters
/// - `ADMIN_API_KEY` (required): bearer key for the admin API
/// - `PAYMENT_WEBHOOK_SECRET` (optional): HMAC secret for the payment
///   gateway callback; the webhook endpoint rejects requests until set
/// - `RESERVE_MINUTES` (optional): reservation window, defaults to 30
/// - `REAPER_INTERVAL_SECS` (optional): sweep interval, defaults to 60
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    pub card_secret: String,

    pub admin_api_key: String,

    #[serde(default)]
    pub payment_webhook_secret: Option<String>,

    #[serde(default = "default_reserve_minutes")]
    pub reserve_minutes: i64,

    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

/// Default reservation window in minutes.
fn default_reserve_minutes() -> i64 {
    30
}

/// Default reaper sweep interval in seconds.
fn default_reaper_interval_secs() -> u64 {
    60
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    /// - CARD_SECRET is shorter than 8 characters
    pub fn from_env() -> anyhow::Result<Self> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Parse environment variables into Config struct
        // Field names are automatically converted: database_url -> DATABASE_URL
        let config = envy::from_env::<Config>()?;

        if config.card_secret.len() < 8 {
            anyhow::bail!("CARD_SECRET must be at least 8 characters");
        }

        Ok(config)
    }
}
