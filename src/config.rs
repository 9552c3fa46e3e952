//! Configuration for the ferry server and client.
//!
//! Supports both command-line arguments and a TOML configuration file.
//! CLI arguments take precedence over config file values, which take
//! precedence over the built-in defaults. The result is resolved once at
//! startup and never changes afterwards.

use clap::{ArgGroup, Parser};
use serde::Deserialize;
use std::path::PathBuf;

use crate::protocol::Request;

/// Command-line arguments for the transfer server
#[derive(Parser, Debug)]
#[command(name = "ferry-server")]
#[command(author = "ferry authors")]
#[command(version = "0.1.0")]
#[command(about = "Serve a directory over the ferry transfer protocol", long_about = None)]
pub struct ServerArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:9999)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Directory holding the served files
    #[arg(short = 'r', long)]
    pub root: Option<PathBuf>,

    /// Maximum number of connections handled at once
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// File that operational logs are appended to
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Command-line arguments for the transfer client
#[derive(Parser, Debug)]
#[command(name = "ferry-client")]
#[command(author = "ferry authors")]
#[command(version = "0.1.0")]
#[command(about = "Download, upload or list files on a ferry server", long_about = None)]
#[command(group(ArgGroup::new("operation").args(["download", "upload", "list"])))]
pub struct ClientArgs {
    /// Download the named file from the server
    #[arg(long, value_name = "NAME")]
    pub download: Option<String>,

    /// Upload the named file to the server
    #[arg(long, value_name = "NAME")]
    pub upload: Option<String>,

    /// List the files available on the server
    #[arg(long)]
    pub list: bool,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Server address (e.g., localhost:9999)
    #[arg(short = 's', long)]
    pub server: Option<String>,

    /// Directory that downloads land in and uploads are read from
    #[arg(short = 'r', long)]
    pub root: Option<PathBuf>,

    /// File that operational logs are appended to
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

impl ClientArgs {
    /// The single operation selected on the command line, if any
    pub fn operation(&self) -> Option<Request> {
        if let Some(ref name) = self.download {
            Some(Request::download(name.clone()))
        } else if let Some(ref name) = self.upload {
            Some(Request::upload(name.clone()))
        } else if self.list {
            Some(Request::list())
        } else {
            None
        }
    }
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Concurrent connection cap
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_connections: default_max_connections(),
        }
    }
}

/// Client-related configuration
#[derive(Debug, Deserialize)]
pub struct ClientSection {
    /// Server address to connect to
    #[serde(default = "default_server")]
    pub server: String,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            server: default_server(),
        }
    }
}

/// File store configuration
#[derive(Debug, Deserialize)]
pub struct StoreSection {
    /// Root directory for transferred files
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            root: default_root(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log file; each binary has its own default
    pub file: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:9999".to_string()
}

fn default_server() -> String {
    "localhost:9999".to_string()
}

fn default_max_connections() -> usize {
    10000
}

fn default_root() -> PathBuf {
    PathBuf::from("files/")
}

fn default_log_level() -> String {
    "info".to_string()
}

const SERVER_LOG_FILE: &str = "server-log.txt";
const CLIENT_LOG_FILE: &str = "client-log.txt";

/// Final resolved server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: String,
    pub root: PathBuf,
    pub max_connections: usize,
    pub log_level: String,
    pub log_file: PathBuf,
}

impl ServerConfig {
    /// Load configuration from process arguments and optional TOML file
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(ServerArgs::parse())
    }

    /// Merge parsed CLI args with the TOML file they point to
    pub fn from_args(cli: ServerArgs) -> Result<Self, ConfigError> {
        let toml_config = load_toml(cli.config.as_ref())?;

        Ok(ServerConfig {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            root: cli.root.unwrap_or(toml_config.store.root),
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
            log_file: cli
                .log_file
                .or(toml_config.logging.file)
                .unwrap_or_else(|| PathBuf::from(SERVER_LOG_FILE)),
        })
    }
}

/// Final resolved client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub operation: Option<Request>,
    pub server: String,
    pub root: PathBuf,
    pub log_level: String,
    pub log_file: PathBuf,
}

impl ClientConfig {
    /// Load configuration from process arguments and optional TOML file
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(ClientArgs::parse())
    }

    /// Merge parsed CLI args with the TOML file they point to
    pub fn from_args(cli: ClientArgs) -> Result<Self, ConfigError> {
        let toml_config = load_toml(cli.config.as_ref())?;

        Ok(ClientConfig {
            operation: cli.operation(),
            server: cli.server.unwrap_or(toml_config.client.server),
            root: cli.root.unwrap_or(toml_config.store.root),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
            log_file: cli
                .log_file
                .or(toml_config.logging.file)
                .unwrap_or_else(|| PathBuf::from(CLIENT_LOG_FILE)),
        })
    }
}

fn load_toml(path: Option<&PathBuf>) -> Result<TomlConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(TomlConfig::default());
    };

    let contents =
        std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead(path.clone(), e))?;
    toml::from_str(&contents).map_err(|e| ConfigError::TomlParse(path.clone(), e))
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
