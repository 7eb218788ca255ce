//! Configuration for the Redis-backed session store.
//!
//! ## Loading strategy
//!
//! `load_config()` searches for `store.yaml` starting at the executable's
//! directory and walking up to 3 parent directories, parses it with
//! `serde_yaml`, and falls back to `Config::default()` on any read or parse
//! failure. A missing or malformed config file is logged, never fatal --
//! the store would rather start against `127.0.0.1:6379` than refuse to
//! start at all.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub redis: RedisConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RedisConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: i64,
    #[serde(default = "default_min_conn")]
    pub min_conn: usize,
    #[serde(default = "default_max_conn")]
    pub max_conn: usize,
    #[serde(default = "default_query_limit")]
    pub query_limit: usize,
    #[serde(default = "default_connect_timeout_millis")]
    pub connect_timeout_millis: u64,
    #[serde(default = "default_socket_timeout_millis")]
    pub socket_timeout_millis: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    6379
}
fn default_min_conn() -> usize {
    1
}
fn default_max_conn() -> usize {
    10
}
fn default_query_limit() -> usize {
    100
}
fn default_connect_timeout_millis() -> u64 {
    2000
}
fn default_socket_timeout_millis() -> u64 {
    3000
}

impl Default for RedisConfig {
    fn default() -> Self {
        RedisConfig {
            host: default_host(),
            port: default_port(),
            password: None,
            database: 0,
            min_conn: default_min_conn(),
            max_conn: default_max_conn(),
            query_limit: default_query_limit(),
            connect_timeout_millis: default_connect_timeout_millis(),
            socket_timeout_millis: default_socket_timeout_millis(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            redis: RedisConfig::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            store: StoreConfig::default(),
        }
    }
}

impl RedisConfig {
    /// `redis://[:password@]host:port/db` connection URL for the `redis` crate.
    pub fn url(&self) -> String {
        match &self.password {
            Some(pw) => format!(
                "redis://:{}@{}:{}/{}",
                pw, self.host, self.port, self.database
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.database),
        }
    }
}

/// Load configuration from `store.yaml`, searching the executable's directory
/// and up to 3 parent directories, falling back to defaults.
pub fn load_config() -> Config {
    let exe_path = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("."));
    let exe_dir = exe_path.parent().unwrap_or_else(|| Path::new("."));

    let mut config_path = PathBuf::from(exe_dir);
    let mut found = config_path.join("store.yaml").exists();

    if !found {
        for _ in 0..3 {
            config_path = match config_path.parent() {
                Some(parent) => parent.to_path_buf(),
                None => break,
            };
            if config_path.join("store.yaml").exists() {
                found = true;
                break;
            }
        }
    }

    if found {
        let config_file = config_path.join("store.yaml");
        match fs::read_to_string(&config_file) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    debug!("loaded configuration from {:?}", config_file);
                    return config;
                }
                Err(e) => {
                    error!("error parsing store.yaml: {}", e);
                }
            },
            Err(e) => {
                error!("error reading store.yaml: {}", e);
            }
        }
    }

    debug!("using default configuration");
    Config::default()
}
