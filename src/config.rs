use std::{env, fmt::Display, str::FromStr, sync::Arc};

use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use thiserror::Error;

use crate::error::QueryError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("invalid {key} value: {info}")]
    Invalid { key: &'static str, info: String },
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub session_secret: Arc<[u8]>,
    /// Base of generated short links, without a trailing slash.
    pub public_url: String,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: require("DATABASE_URL")?,
            max_connections: try_load("DATABASE_MAX_CONNECTIONS", "5")?,
            session_secret: Arc::from(require("SESSION_SECRET")?.into_bytes()),
            public_url: try_load::<String>("PUBLIC_URL", "http://localhost")?
                .trim_end_matches('/')
                .to_owned(),
        })
    }

    pub async fn connect(&self) -> Result<Pool<Postgres>, ConfigError> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.database_url)
            .await
            .map_err(QueryError::from)?;
        log::info!("Connected to database with {} connections", self.max_connections);
        Ok(pool)
    }
}

pub async fn migrate(pool: &Pool<Postgres>) -> Result<(), ConfigError> {
    sqlx::migrate!().run(pool).await?;
    log::info!("Database migrations applied");
    Ok(())
}

fn require(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| {
        log::warn!("Environment variable {key} not found");
        ConfigError::Missing(key)
    })
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    env::var(key)
        .unwrap_or_else(|_| {
            log::info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid {
            key,
            info: e.to_string(),
        })
}
