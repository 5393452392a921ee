//! MySQL backend

use super::{ReportStore, StorageError};
use crate::config::Config;
use crate::report::Report;
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::Connection;
use std::time::Duration;

const DEFAULT_MYSQL_PORT: u16 = 3306;

/// Report store backed by a MySQL connection pool.
///
/// The `servers` table is not created here; see `sql/servers.sql`.
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    /// Build the pool for the configured server.
    ///
    /// No connection is made until first use, so call [`ReportStore::ping`]
    /// to find out whether the server is actually there.
    pub fn open(config: &Config) -> Result<Self, StorageError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy_with(connect_options(config)?);

        Ok(Self { pool })
    }
}

#[async_trait]
impl ReportStore for MySqlStore {
    async fn ping(&self) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await?;
        conn.ping().await?;
        Ok(())
    }

    async fn insert_report(&self, report: &Report) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO servers (email, version) VALUES (?, ?)")
            .bind(&report.email)
            .bind(&report.version)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(db_err) = &e {
                    if db_err.is_unique_violation() {
                        return StorageError::UniqueViolation;
                    }
                }
                StorageError::MySql(e)
            })?;

        Ok(())
    }
}

fn connect_options(config: &Config) -> Result<MySqlConnectOptions, StorageError> {
    let (host, port) = split_host_port(&config.db_host)?;

    Ok(MySqlConnectOptions::new()
        .host(host)
        .port(port)
        .username(&config.db_user)
        .password(&config.db_pass)
        .database(&config.db_name))
}

/// Split `DbHost` into host and port, defaulting to 3306.
fn split_host_port(db_host: &str) -> Result<(&str, u16), StorageError> {
    match db_host.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') || is_bracketed(host) => {
            let port = port.parse().map_err(|_| {
                StorageError::InvalidTarget(format!("bad port in DbHost `{}`", db_host))
            })?;
            Ok((host.trim_start_matches('[').trim_end_matches(']'), port))
        }
        _ => Ok((db_host, DEFAULT_MYSQL_PORT)),
    }
}

fn is_bracketed(host: &str) -> bool {
    host.starts_with('[') && host.ends_with(']')
}
