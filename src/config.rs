//! Runtime configuration read from the environment. `main` loads `.env` before this runs.

use std::env;

use crate::errors::{Error, Result};

const DEFAULT_DATABASE_URL: &str = "sqlite://voicecart.sqlite?mode=rwc";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    /// HS256 secret for session tokens.
    pub secret: String,
    pub delivery_window_days: i64,
    pub seed_demo_data: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let secret = env::var("SECRET")
            .map_err(|_| Error::Config("SECRET must be set".to_owned()))?;

        let delivery_window_days = match env::var("DELIVERY_WINDOW_DAYS") {
            Ok(value) => value.parse::<i64>().map_err(|err| {
                Error::Config(format!("DELIVERY_WINDOW_DAYS is not a number: {err}"))
            })?,
            Err(_) => 5,
        };

        let seed_demo_data = env::var("SEED_DEMO_DATA")
            .map(|value| !matches!(value.as_str(), "0" | "false" | "no"))
            .unwrap_or(true);

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_owned()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_owned()),
            secret,
            delivery_window_days,
            seed_demo_data,
        })
    }

    /// In-memory database, fixed secret; used by tests.
    pub fn in_memory(secret: impl Into<String>) -> Self {
        Self {
            database_url: "sqlite::memory:".to_owned(),
            bind_addr: "127.0.0.1:0".to_owned(),
            secret: secret.into(),
            delivery_window_days: 5,
            seed_demo_data: false,
        }
    }
}
