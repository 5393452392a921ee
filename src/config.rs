//! Configuration loading for the server info collector.
//!
//! Reads a YAML file into [`Config`]. Keys absent from the file keep their
//! defaults, so the service always has something runnable against a local
//! database.

use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "conf.yaml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("could not serialize configuration: {0}")]
    Serialize(#[source] serde_yaml::Error),
}

/// Which database driver the storage connector should use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbDriver {
    /// Networked MySQL server (`DbHost`, `DbUser`, `DbPass`, `DbName`)
    #[default]
    Mysql,
    /// Local SQLite file; `DbName` is the file path
    Sqlite,
}

/// Service configuration
///
/// Keys use the PascalCase names of the deployed configuration files; the
/// lowercase spellings are accepted too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Port to listen on
    #[serde(rename = "Port", alias = "port")]
    pub port: String,

    /// Database host, optionally with a `:port` suffix
    #[serde(rename = "DbHost", alias = "dbhost")]
    pub db_host: String,

    #[serde(rename = "DbUser", alias = "dbuser")]
    pub db_user: String,

    #[serde(rename = "DbPass", alias = "dbpass")]
    pub db_pass: String,

    /// Database (schema) name, or file path for the SQLite driver
    #[serde(rename = "DbName", alias = "dbname")]
    pub db_name: String,

    #[serde(rename = "DbDriver", alias = "dbdriver")]
    pub db_driver: DbDriver,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: "8080".to_string(),
            db_host: "localhost".to_string(),
            db_user: "serverinfo".to_string(),
            db_pass: "serverinfo".to_string(),
            db_name: "serverinfo".to_string(),
            db_driver: DbDriver::Mysql,
        }
    }
}

impl Config {
    /// Load configuration from `path`.
    ///
    /// Returns `Ok(None)` when the file does not exist. A file that exists but
    /// cannot be read or parsed is an error; nothing is partially applied.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        Self::from_yaml(&contents)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Parse a YAML document, layering it over the defaults.
    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        // An empty or comment-only file is a null document
        let value: serde_yaml::Value = serde_yaml::from_str(contents)?;
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    /// Default configuration rendered as YAML, for operators to copy.
    pub fn example_yaml() -> Result<String, ConfigError> {
        serde_yaml::to_string(&Self::default()).map_err(ConfigError::Serialize)
    }

    /// Address the HTTP listener binds to.
    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

/// Text shown to the operator when no configuration file exists.
pub fn missing_notice(path: &Path) -> Result<String, ConfigError> {
    Ok(format!(
        "Error: could not find configuration file: {}\nExample configuration file:\n{}",
        path.display(),
        Config::example_yaml()?
    ))
}
