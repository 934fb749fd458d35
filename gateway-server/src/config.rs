//! JSON configuration (§6), loaded the way the teacher's
//! `luma-server::config::Config::load` loads TOML — same shape, JSON
//! instead of TOML, same `$ENV / ./config.json / /etc/<app>/config.json`
//! search order.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerSection,
    pub database: DatabaseSection,
    #[serde(default)]
    pub pool: PoolSection,
    #[serde(default)]
    pub connection: ConnectionSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub monitor: MonitorSection,
    #[serde(default)]
    pub optimizer: OptimizerSection,
    #[serde(default)]
    pub paging: PagingSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    pub server_version: String,
    #[serde(default = "default_keep_alive_period")]
    pub keep_alive_period: u64,
    #[serde(default)]
    pub debug: bool,
}

fn default_keep_alive_period() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_idle_timeout_s")]
    pub idle_timeout_s: u64,
    #[serde(default)]
    pub enabled_sources: Vec<String>,
    #[serde(default)]
    pub database_dir: Option<PathBuf>,
}

fn default_max_connections() -> u32 {
    100
}

fn default_idle_timeout_s() -> u64 {
    600
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PoolSection {
    #[serde(default)]
    pub goroutine_pool: GoroutinePoolConfig,
    #[serde(default)]
    pub object_pool: ObjectPoolConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoroutinePoolConfig {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

impl Default for GoroutinePoolConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            queue_size: default_queue_size(),
        }
    }
}

fn default_max_workers() -> usize {
    num_cpus()
}

fn default_queue_size() -> usize {
    1024
}

fn num_cpus() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectPoolConfig {
    #[serde(default = "default_object_pool_max_size")]
    pub max_size: usize,
    #[serde(default)]
    pub min_idle: usize,
    #[serde(default = "default_object_pool_max_idle")]
    pub max_idle: usize,
}

impl Default for ObjectPoolConfig {
    fn default() -> Self {
        Self {
            max_size: default_object_pool_max_size(),
            min_idle: 0,
            max_idle: default_object_pool_max_idle(),
        }
    }
}

fn default_object_pool_max_size() -> usize {
    64
}

fn default_object_pool_max_idle() -> usize {
    16
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionSection {
    #[serde(default = "default_max_open")]
    pub max_open: u32,
    #[serde(default = "default_max_idle")]
    pub max_idle: u32,
    #[serde(default = "default_lifetime")]
    pub lifetime: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
}

impl Default for ConnectionSection {
    fn default() -> Self {
        Self {
            max_open: default_max_open(),
            max_idle: default_max_idle(),
            lifetime: default_lifetime(),
            idle_timeout: default_idle_timeout(),
        }
    }
}

fn default_max_open() -> u32 {
    50
}
fn default_max_idle() -> u32 {
    10
}
fn default_lifetime() -> u64 {
    3600
}
fn default_idle_timeout() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    #[serde(default = "default_session_max_age")]
    pub max_age: u64,
    #[serde(default = "default_gc_interval")]
    pub gc_interval: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            max_age: default_session_max_age(),
            gc_interval: default_gc_interval(),
        }
    }
}

fn default_session_max_age() -> u64 {
    28800
}
fn default_gc_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CacheSection {
    #[serde(default)]
    pub query_cache: CacheConfig,
    #[serde(default)]
    pub result_cache: CacheConfig,
    #[serde(default)]
    pub schema_cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_max_size")]
    pub max_size: usize,
    #[serde(default = "default_cache_ttl")]
    pub ttl: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_cache_max_size(),
            ttl: default_cache_ttl(),
        }
    }
}

fn default_cache_max_size() -> usize {
    1000
}
fn default_cache_ttl() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MonitorSection {
    #[serde(default)]
    pub slow_query: SlowQueryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlowQueryConfig {
    #[serde(default = "default_slow_query_threshold")]
    pub threshold: u64,
    #[serde(default = "default_slow_query_max_entries")]
    pub max_entries: usize,
}

impl Default for SlowQueryConfig {
    fn default() -> Self {
        Self {
            threshold: default_slow_query_threshold(),
            max_entries: default_slow_query_max_entries(),
        }
    }
}

fn default_slow_query_threshold() -> u64 {
    1000
}
fn default_slow_query_max_entries() -> usize {
    500
}

#[derive(Debug, Clone, Deserialize)]
pub struct OptimizerSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for OptimizerSection {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PagingSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_paging_max_memory_mb")]
    pub max_memory_mb: u64,
    #[serde(default = "default_paging_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub spill_dir: Option<PathBuf>,
    #[serde(default = "default_paging_evict_interval")]
    pub evict_interval: u64,
}

fn default_paging_max_memory_mb() -> u64 {
    512
}
fn default_paging_page_size() -> usize {
    8192
}
fn default_paging_evict_interval() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Searches, in order, `$SQLEXEC_CONFIG`, `./config.json`, then
    /// `/etc/sqlexec-gatewayd/config.json` (§6).
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = explicit_path
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("SQLEXEC_CONFIG").map(PathBuf::from))
            .or_else(|| Some(PathBuf::from("./config.json")).filter(|p| p.exists()))
            .or_else(|| Some(PathBuf::from("/etc/sqlexec-gatewayd/config.json")).filter(|p| p.exists()))
            .context("no config file found ($SQLEXEC_CONFIG, ./config.json, /etc/sqlexec-gatewayd/config.json)")?;

        let contents = std::fs::read_to_string(&path).with_context(|| format!("reading config file {path:?}"))?;
        let config: Config = serde_json::from_str(&contents).with_context(|| format!("parsing config file {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("server.port must be in [1, 65535]");
        }
        if self.database.max_connections < 1 {
            bail!("database.max_connections must be >= 1");
        }
        if self.pool.goroutine_pool.max_workers < 1 {
            bail!("pool.goroutine_pool.max_workers must be >= 1");
        }
        if self.pool.object_pool.max_size < 1 {
            bail!("pool.object_pool.max_size must be >= 1");
        }
        if self.connection.max_open < 1 {
            bail!("connection.max_open must be >= 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_port() {
        let json = r#"{"server":{"host":"127.0.0.1","port":0,"server_version":"8.0.35-sqlexec"},"database":{"enabled_sources":["memory"]}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn defaults_fill_in_missing_sections() {
        let json = r#"{"server":{"host":"127.0.0.1","port":3306,"server_version":"8.0.35-sqlexec"},"database":{"enabled_sources":["memory"]}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.connection.max_open, 50);
        assert_eq!(config.logging.level, "info");
    }
}
