//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::str::FromStr;

/// Default cache capacity: 10 MiB
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 10 * 1024 * 1024;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum total size of cached content in bytes
    pub max_cache_size: u64,
    /// Storage backend name, parsed at startup
    pub backend: String,
    /// Directory holding blobs for the filesystem backend
    pub storage_location: PathBuf,
    /// Path of the metadata database
    pub metadata_path: PathBuf,
    /// HTTP bind address
    pub server_host: IpAddr,
    /// HTTP server port
    pub server_port: u16,
    /// Orphan sweep interval in seconds, 0 disables the periodic sweep
    pub sweep_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_CACHE_SIZE` - Cache capacity in bytes (default: 10485760)
    /// - `STORAGE_BACKEND` - `filesystem` or `memory` (default: filesystem)
    /// - `STORAGE_LOCATION` - Blob directory (default: /tmp/packrat)
    /// - `METADATA_PATH` - Metadata database file (default: /tmp/packrat.redb)
    /// - `SERVER_HOST` - Bind address (default: 0.0.0.0)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `SWEEP_INTERVAL` - Orphan sweep frequency in seconds (default: 300)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_cache_size: parse_var("MAX_CACHE_SIZE").unwrap_or(defaults.max_cache_size),
            backend: env::var("STORAGE_BACKEND").unwrap_or(defaults.backend),
            storage_location: env::var_os("STORAGE_LOCATION")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_location),
            metadata_path: env::var_os("METADATA_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.metadata_path),
            server_host: parse_var("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            sweep_interval: parse_var("SWEEP_INTERVAL").unwrap_or(defaults.sweep_interval),
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            backend: "filesystem".to_string(),
            storage_location: PathBuf::from("/tmp/packrat"),
            metadata_path: PathBuf::from("/tmp/packrat.redb"),
            server_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            server_port: 3000,
            sweep_interval: 300,
        }
    }
}
