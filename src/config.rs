use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use anyhow::Context;
use tracing::info;

use crate::search::DEFAULT_SEARCH_WINDOW;

pub const DEFAULT_CACHE_PATH: &str = "data/popular_daily.json";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub cache_path: PathBuf,
    pub search_window: usize,
    pub max_connections: u32,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").ok(),
            cache_path: PathBuf::from(load_or("NOTESHARE_CACHE_PATH", DEFAULT_CACHE_PATH)),
            search_window: try_load("NOTESHARE_SEARCH_WINDOW", DEFAULT_SEARCH_WINDOW)?,
            max_connections: try_load("NOTESHARE_DB_MAX_CONNECTIONS", 5)?,
        })
    }

    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to the note-sharing Postgres instance")
    }
}

fn load_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    })
}

fn try_load<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr + Display,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {key} value: {raw}")),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
