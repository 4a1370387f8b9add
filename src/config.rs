//! Configuration module for cache-proxy.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::error::ConfigError;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Default total cache budget in bytes.
pub const DEFAULT_MAX_CACHE_SIZE: usize = 1_049_000;

/// Default cap on a single cached response in bytes.
pub const DEFAULT_MAX_OBJECT_SIZE: usize = 102_400;

/// Default size of each block read from the origin while relaying.
pub const DEFAULT_RELAY_CHUNK_SIZE: usize = 8192;

/// Default cap on a single request or header line.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 8192;

/// User-Agent sent to every origin.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:3.10.0) Gecko/20191101 Firefox/63.0.1";

/// Command-line arguments for the proxy
#[derive(Parser, Debug)]
#[command(name = "cache-proxy")]
#[command(author = "cache-proxy authors")]
#[command(version = "0.1.0")]
#[command(about = "A caching HTTP/1.0 forwarding proxy", long_about = None)]
pub struct CliArgs {
    /// Port to listen on
    pub port: u16,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1)
    #[arg(short = 'l', long)]
    pub host: Option<String>,

    /// Total cache budget in bytes
    #[arg(short = 'm', long)]
    pub max_cache_size: Option<usize>,

    /// Largest response that will be cached, in bytes
    #[arg(short = 'o', long)]
    pub max_object_size: Option<usize>,

    /// Number of runtime worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Number of runtime worker threads
    pub workers: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            workers: None,
        }
    }
}

/// Object cache sizing
#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    /// Total bytes the cache may hold
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: usize,
    /// Largest single response that is cached
    #[serde(default = "default_max_object_size")]
    pub max_object_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cache_size: default_max_cache_size(),
            max_object_size: default_max_object_size(),
        }
    }
}

/// Request forwarding configuration
#[derive(Debug, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_relay_chunk_size")]
    pub relay_chunk_size: usize,
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            relay_chunk_size: default_relay_chunk_size(),
            max_line_length: default_max_line_length(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_max_cache_size() -> usize {
    DEFAULT_MAX_CACHE_SIZE
}

fn default_max_object_size() -> usize {
    DEFAULT_MAX_OBJECT_SIZE
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_relay_chunk_size() -> usize {
    DEFAULT_RELAY_CHUNK_SIZE
}

fn default_max_line_length() -> usize {
    DEFAULT_MAX_LINE_LENGTH
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_cache_size: usize,
    pub max_object_size: usize,
    pub user_agent: String,
    pub relay_chunk_size: usize,
    pub max_line_length: usize,
    pub workers: Option<usize>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    ///
    /// Argument errors are reported by clap and the process exits with
    /// status 1 (help and version output exit with 0).
    pub fn load() -> Result<Self, ConfigError> {
        let cli = match CliArgs::try_parse() {
            Ok(cli) => cli,
            Err(e) if !e.use_stderr() => e.exit(),
            Err(e) => {
                let _ = e.print();
                std::process::exit(1);
            }
        };
        Self::from_cli(cli)
    }

    /// Merge parsed CLI arguments with the TOML file they point at, if any.
    pub fn from_cli(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|source| ConfigError::FileRead {
                    path: config_path.clone(),
                    source,
                })?;
            toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
                path: config_path.clone(),
                source,
            })?
        } else {
            TomlConfig::default()
        };

        let config = Self::merge(cli, toml_config);
        config.validate()?;
        Ok(config)
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        Config {
            host: cli.host.unwrap_or(toml_config.server.host),
            port: cli.port,
            max_cache_size: cli
                .max_cache_size
                .unwrap_or(toml_config.cache.max_cache_size),
            max_object_size: cli
                .max_object_size
                .unwrap_or(toml_config.cache.max_object_size),
            user_agent: toml_config.proxy.user_agent,
            relay_chunk_size: toml_config.proxy.relay_chunk_size,
            max_line_length: toml_config.proxy.max_line_length,
            workers: cli.workers.or(toml_config.server.workers),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        }
    }

    /// Reject combinations the proxy cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_object_size == 0 {
            return Err(ConfigError::Invalid(
                "max_object_size must be greater than zero".to_string(),
            ));
        }
        if self.max_object_size > self.max_cache_size {
            return Err(ConfigError::Invalid(format!(
                "max_object_size ({}) must not exceed max_cache_size ({})",
                self.max_object_size, self.max_cache_size
            )));
        }
        if self.relay_chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "relay_chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.max_line_length == 0 {
            return Err(ConfigError::Invalid(
                "max_line_length must be greater than zero".to_string(),
            ));
        }
        if self.workers == Some(0) {
            return Err(ConfigError::Invalid(
                "workers must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Address string the listener binds to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
impl Config {
    /// Loopback config on an ephemeral port with default sizing.
    pub fn for_tests() -> Self {
        Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            max_object_size: DEFAULT_MAX_OBJECT_SIZE,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            relay_chunk_size: DEFAULT_RELAY_CHUNK_SIZE,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            workers: None,
            log_level: "info".to_string(),
        }
    }
}
