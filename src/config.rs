use crate::core::{MysqliiError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default separator placed between the statements of a batch.
pub const DEFAULT_QUERY_DELIMITER: &str = ";";

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectOptions,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Parameters for opening a connection. Unset fields use the driver's
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConnectOptions {
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub dbname: Option<String>,
    pub port: Option<u16>,
    pub socket: Option<String>,
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn dbname(mut self, dbname: impl Into<String>) -> Self {
        self.dbname = Some(dbname.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn socket(mut self, socket: impl Into<String>) -> Self {
        self.socket = Some(socket.into());
        self
    }
}

/// Per-session settings of the facade.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_query_delimiter")]
    pub query_delimiter: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            query_delimiter: default_query_delimiter(),
        }
    }
}

fn default_query_delimiter() -> String {
    DEFAULT_QUERY_DELIMITER.to_string()
}

impl Config {
    /// Parses and validates configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Config> {
        let config: Config = toml::from_str(content)?;
        if config.session.query_delimiter.is_empty() {
            return Err(MysqliiError::Config(
                "session.query_delimiter must not be empty".to_string(),
            ));
        }
        Ok(config)
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Example
///
/// ```no_run
/// let config = mysqlii::config::load_config("mysqlii.toml").expect("Failed to load config");
/// println!("{:?}", config.connection.host);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    debug!("Loading configuration from {:?}", path.as_ref());
    let content = fs::read_to_string(path)?;
    Config::from_toml_str(&content)
}

/// Location of the per-user configuration file, `<config dir>/mysqlii/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mysqlii").join("config.toml"))
}

/// Loads the per-user configuration file if there is one.
pub fn load_default_config() -> Result<Option<Config>> {
    match default_config_path() {
        Some(path) if path.is_file() => load_config(path).map(Some),
        _ => Ok(None),
    }
}
