pub mod config;
pub mod operations;
pub mod schema;

use std::sync::Arc;
use std::time::Instant;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::db::config::{DbConfig, DbConfigError};

#[derive(Clone)]
pub struct DatabaseProxy {
    config: DbConfig,
    pool: SqlitePool,
}

impl DatabaseProxy {
    pub async fn from_env() -> Result<Arc<Self>, DbInitError> {
        let config = DbConfig::from_env()?;
        Self::connect(config).await
    }

    pub async fn connect(config: DbConfig) -> Result<Arc<Self>, DbInitError> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DbInitError::Io(e.to_string()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(config.journal_mode.to_sqlx())
            .synchronous(config.synchronous.to_sqlx())
            .foreign_keys(config.foreign_keys)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        schema::run_migrations(&pool).await?;

        tracing::info!(
            path = %config.path.display(),
            max_connections = config.max_connections,
            "sqlite pool ready"
        );

        Ok(Arc::new(Self { config, pool }))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub async fn check_health(&self) -> DbHealth {
        let started = Instant::now();
        let result = tokio::time::timeout(
            self.config.health_check_timeout,
            sqlx::query("SELECT 1").execute(&self.pool),
        )
        .await;

        match result {
            Ok(Ok(_)) => DbHealth::Connected {
                latency_ms: started.elapsed().as_millis() as u64,
            },
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "database health check failed");
                DbHealth::Disconnected
            }
            Err(_) => DbHealth::Timeout,
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbHealth {
    Connected { latency_ms: u64 },
    Timeout,
    Disconnected,
}

#[derive(Debug, Error)]
pub enum DbInitError {
    #[error(transparent)]
    Config(#[from] DbConfigError),
    #[error("IO error: {0}")]
    Io(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}
