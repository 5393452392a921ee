//! Startup sequence: configuration, then storage, then the listener.
//!
//! Every step is fallible and short-circuits; nothing here is retried.

use crate::config::{self, Config, ConfigError};
use crate::server::ReportServer;
use crate::storage::{self, ConnectError};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] ConnectError),
    #[error("could not listen on {addr}: {source}")]
    Listen {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Load configuration from `config_path`, connect to the database and bind
/// the listener.
///
/// Returns `Ok(None)` when there is no configuration file; an example
/// configuration has been printed and the caller should exit without serving.
pub async fn start(config_path: &Path) -> Result<Option<ReportServer>, StartupError> {
    let config = match Config::load(config_path)? {
        Some(config) => config,
        None => {
            println!("{}", config::missing_notice(config_path)?);
            return Ok(None);
        }
    };
    info!("Configuration loaded from {}", config_path.display());

    start_with_config(config).await.map(Some)
}

/// The part of [`start`] that runs once a configuration is in hand.
pub async fn start_with_config(config: Config) -> Result<ReportServer, StartupError> {
    let store = storage::connect(&config).await?;

    let addr = config.listen_addr();
    ReportServer::bind(config, store)
        .await
        .map_err(|source| StartupError::Listen { addr, source })
}
