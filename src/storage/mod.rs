//! Report storage
//!
//! The handler only sees [`ReportStore`]; each backend turns its own driver
//! errors into [`StorageError`], in particular [`StorageError::UniqueViolation`]
//! when the `(email, version)` pair is already present.

mod mysql;
mod sqlite;

pub use mysql::MySqlStore;
pub use sqlite::SqliteStore;

use crate::config::{Config, DbDriver};
use crate::report::Report;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("report is already stored")]
    UniqueViolation,
    #[error("invalid connection target: {0}")]
    InvalidTarget(String),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("MySQL error: {0}")]
    MySql(#[from] sqlx::Error),
}

/// Why the storage connector could not produce a live handle.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("could not connect to the database: {0}")]
    Open(#[source] StorageError),
    #[error("database could not be pinged: {0}")]
    Ping(#[source] StorageError),
}

/// Write side of the `servers` table
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Round trip to the database to prove it is reachable.
    async fn ping(&self) -> Result<(), StorageError>;

    /// Insert one report. Returns [`StorageError::UniqueViolation`] if the
    /// pair already exists.
    async fn insert_report(&self, report: &Report) -> Result<(), StorageError>;
}

/// Open the database named by `config` and check that it answers.
pub async fn connect(config: &Config) -> Result<Arc<dyn ReportStore>, ConnectError> {
    let store: Arc<dyn ReportStore> = match config.db_driver {
        DbDriver::Mysql => Arc::new(MySqlStore::open(config).map_err(ConnectError::Open)?),
        DbDriver::Sqlite => {
            Arc::new(SqliteStore::open(&config.db_name).map_err(ConnectError::Open)?)
        }
    };

    store.ping().await.map_err(ConnectError::Ping)?;
    info!(driver = ?config.db_driver, host = %config.db_host, db = %config.db_name, "Connected to database");

    Ok(store)
}
