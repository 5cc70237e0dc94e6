use fleetcache_core::MAX_TTL;
use fleetcache_log::{DEFAULT_MAX_LEN, RedisStreamOptions};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Expiry window of cached entries
    #[serde(default)]
    pub cache: CacheConfig,
    /// Invalidation log
    #[serde(default)]
    pub log: LogConfig,
    /// Redis connection, used when `log.backend = "redis"`
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        // Cache validations
        if self.cache.min_ttl_secs == 0 {
            return Err("cache.min_ttl_secs must be > 0".into());
        }
        if self.cache.max_ttl_secs < self.cache.min_ttl_secs {
            return Err("cache.max_ttl_secs must be >= cache.min_ttl_secs".into());
        }
        if self.cache.max_ttl() > MAX_TTL {
            return Err(format!(
                "cache.max_ttl_secs must be <= {}",
                MAX_TTL.as_secs()
            ));
        }
        // Log validations
        if self.log.shards == 0 || self.log.page_size == 0 {
            return Err("log.shards and log.page_size must be > 0".into());
        }
        if self.log.max_record_bytes == 0 || self.log.max_append_bytes == 0 {
            return Err("log size bounds must be > 0".into());
        }
        if self.log.max_record_bytes > self.log.max_append_bytes {
            return Err("log.max_record_bytes must be <= log.max_append_bytes".into());
        }
        if self.log.backend == LogBackend::Redis {
            if self.redis.url.is_empty() {
                return Err("log.backend=redis requires redis.url".into());
            }
            if self.redis.pool_size == 0 {
                return Err("redis.pool_size must be > 0".into());
            }
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    /// Settings for the Redis Streams transport.
    pub fn redis_stream_options(&self) -> RedisStreamOptions {
        RedisStreamOptions {
            url: self.redis.url.clone(),
            pool_size: self.redis.pool_size,
            timeout: Duration::from_millis(self.redis.timeout_ms),
            stream_prefix: self.redis.stream_prefix.clone(),
            shards: self.log.shards,
            page_size: self.log.page_size,
            max_len: (self.redis.stream_max_len > 0).then_some(self.redis.stream_max_len),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

/// Cached entries expire at a random point between `min_ttl_secs` and
/// `max_ttl_secs` after insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_min_ttl_secs")]
    pub min_ttl_secs: u64,
    #[serde(default = "default_max_ttl_secs")]
    pub max_ttl_secs: u64,
}

fn default_min_ttl_secs() -> u64 {
    3600
}
fn default_max_ttl_secs() -> u64 {
    5400
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            min_ttl_secs: default_min_ttl_secs(),
            max_ttl_secs: default_max_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn min_ttl(&self) -> Duration {
        Duration::from_secs(self.min_ttl_secs)
    }
    pub fn max_ttl(&self) -> Duration {
        Duration::from_secs(self.max_ttl_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogBackend {
    /// In-process log; only this instance sees its invalidations
    #[default]
    Memory,
    /// Redis Streams, shared by every instance pointed at the same server
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub backend: LogBackend,
    #[serde(default = "default_shards")]
    pub shards: usize,
    /// Records per fetch and shards per listing call
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_max_record_bytes")]
    pub max_record_bytes: usize,
    #[serde(default = "default_max_append_bytes")]
    pub max_append_bytes: usize,
}

fn default_shards() -> usize {
    4
}
fn default_page_size() -> usize {
    1000
}
fn default_max_record_bytes() -> usize {
    fleetcache_log::LogOptions::DEFAULT_MAX_RECORD_BYTES
}
fn default_max_append_bytes() -> usize {
    fleetcache_log::LogOptions::DEFAULT_MAX_APPEND_BYTES
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            backend: LogBackend::default(),
            shards: default_shards(),
            page_size: default_page_size(),
            max_record_bytes: default_max_record_bytes(),
            max_append_bytes: default_max_append_bytes(),
        }
    }
}

impl LogConfig {
    pub fn options(&self) -> fleetcache_log::LogOptions {
        fleetcache_log::LogOptions {
            max_record_bytes: self.max_record_bytes,
            max_append_bytes: self.max_append_bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Connection timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,

    /// Shard `n` is stored in the stream `{stream_prefix}:{n}`
    #[serde(default = "default_stream_prefix")]
    pub stream_prefix: String,

    /// Approximate number of entries kept per stream, 0 to never trim
    #[serde(default = "default_stream_max_len")]
    pub stream_max_len: usize,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".into()
}
fn default_redis_pool_size() -> usize {
    8
}
fn default_redis_timeout_ms() -> u64 {
    2000
}
fn default_stream_prefix() -> String {
    "fleetcache:invalidations".into()
}
fn default_stream_max_len() -> usize {
    DEFAULT_MAX_LEN
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
            stream_prefix: default_stream_prefix(),
            stream_max_len: default_stream_max_len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_PATH: &str = "fleetcache.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., FLEETCACHE__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("FLEETCACHE")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
