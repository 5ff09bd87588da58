//! Configuration for WaBulk

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that points at an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "WABULK_CONFIG";

/// Prefix for environment overrides (`WABULK__HTTP__PORT=9090`)
pub const ENV_PREFIX: &str = "WABULK";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub http: HttpConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Dispatcher configuration
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Per-campaign pacing
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Outbound WhatsApp gateway
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins; empty means any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Maximum accepted request body (spreadsheet + media + form fields)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_upload_bytes() -> usize {
    32 * 1024 * 1024
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database backend: "postgres" or "memory"
    #[serde(default = "default_db_backend")]
    pub backend: String,

    /// Database URL (for postgres)
    pub url: Option<String>,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: default_db_backend(),
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

fn default_db_backend() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Scheduler wake-up period
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Deadline for a graceful stop
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,

    /// Capacity of the job submission channel
    #[serde(default = "default_submit_queue")]
    pub submit_queue: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            stop_timeout_secs: default_stop_timeout_secs(),
            submit_queue: default_submit_queue(),
        }
    }
}

impl DispatcherConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

fn default_tick_interval_ms() -> u64 {
    100
}

fn default_stop_timeout_secs() -> u64 {
    5
}

fn default_submit_queue() -> usize {
    32
}

/// Per-campaign pacing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Minimum spacing between sends inside a batch
    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,

    /// Cooldown after a full batch
    #[serde(default = "default_pause_secs")]
    pub pause_secs: u64,

    /// Batch size for campaigns without an installed rate
    #[serde(default = "default_batch_size")]
    pub default_batch_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            send_interval_ms: default_send_interval_ms(),
            pause_secs: default_pause_secs(),
            default_batch_size: default_batch_size(),
        }
    }
}

impl RateLimitConfig {
    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }

    pub fn pause(&self) -> Duration {
        Duration::from_secs(self.pause_secs)
    }
}

fn default_send_interval_ms() -> u64 {
    1000
}

fn default_pause_secs() -> u64 {
    3600
}

fn default_batch_size() -> u32 {
    20
}

/// WhatsGate client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Per-request timeout
    #[serde(default = "default_gateway_timeout_secs")]
    pub timeout_secs: u64,

    /// Additional attempts for network-class failures
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay between attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Largest media payload accepted for sending
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,

    /// How long credentials loaded from the settings store are reused
    #[serde(default = "default_settings_cache_ttl_secs")]
    pub settings_cache_ttl_secs: u64,

    /// Number probed by the connection test
    #[serde(default = "default_check_number")]
    pub check_number: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_gateway_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            max_file_size: default_max_file_size(),
            settings_cache_ttl_secs: default_settings_cache_ttl_secs(),
            check_number: default_check_number(),
        }
    }
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn settings_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.settings_cache_ttl_secs)
    }
}

fn default_gateway_timeout_secs() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    1000
}

/// 10 MiB
pub const MAX_MEDIA_BYTES: usize = 10 * 1024 * 1024;

fn default_max_file_size() -> usize {
    MAX_MEDIA_BYTES
}

fn default_settings_cache_ttl_secs() -> u64 {
    60
}

fn default_check_number() -> String {
    "79999999999".to_string()
}

impl Config {
    /// Load configuration from file, applying environment overrides
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let builder = config::Config::builder().add_source(config::File::from(path));
        Self::build(builder)
    }

    /// Parse configuration from an in-memory YAML document
    pub fn from_yaml_str(content: &str) -> crate::Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Yaml));
        Self::build(builder)
    }

    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> crate::Result<Self> {
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("http.cors_origins"),
            )
            .build()
            .map_err(|e| crate::Error::Config(format!("Failed to read config: {}", e)))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment and file
    pub fn load() -> crate::Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Self::from_file(Path::new(&path));
        }

        let paths = [
            PathBuf::from("./config.yaml"),
            PathBuf::from("./config.toml"),
            PathBuf::from("/etc/wabulk/config.yaml"),
            PathBuf::from("/etc/wabulk/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        // Environment only
        Self::build(config::Config::builder())
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        match self.database.backend.as_str() {
            "postgres" => {
                if self.database.url.as_deref().map_or(true, str::is_empty) {
                    return Err(crate::Error::Config(
                        "database.url is required for the postgres backend".to_string(),
                    ));
                }
            }
            "memory" => {}
            other => {
                return Err(crate::Error::Config(format!(
                    "Unsupported database backend: {}",
                    other
                )))
            }
        }

        if !matches!(self.logging.format.as_str(), "json" | "text") {
            return Err(crate::Error::Config(format!(
                "Unsupported log format: {}",
                self.logging.format
            )));
        }

        if self.dispatcher.tick_interval_ms == 0 {
            return Err(crate::Error::Config(
                "dispatcher.tick_interval_ms must be positive".to_string(),
            ));
        }

        if self.rate_limit.default_batch_size == 0 {
            return Err(crate::Error::Config(
                "rate_limit.default_batch_size must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let http = HttpConfig::default();
        assert_eq!(http.host, "0.0.0.0");
        assert_eq!(http.port, 8080);

        let rate = RateLimitConfig::default();
        assert_eq!(rate.send_interval(), Duration::from_secs(1));
        assert_eq!(rate.pause(), Duration::from_secs(3600));
        assert_eq!(rate.default_batch_size, 20);

        let dispatcher = DispatcherConfig::default();
        assert_eq!(dispatcher.tick_interval(), Duration::from_millis(100));
        assert_eq!(dispatcher.stop_timeout(), Duration::from_secs(5));

        let gateway = GatewayConfig::default();
        assert_eq!(gateway.max_file_size, 10 * 1024 * 1024);
        assert_eq!(gateway.retry_attempts, 2);
    }

    #[test]
    fn test_parse_config() {
        let yaml = r#"
http:
  port: 9090
database:
  backend: postgres
  url: postgres://localhost/wabulk
logging:
  level: debug
  format: text
rate_limit:
  send_interval_ms: 10
  pause_secs: 1
"#;

        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.http.port, 9090);
        assert_eq!(config.database.backend, "postgres");
        assert_eq!(config.logging.format, "text");
        assert_eq!(config.rate_limit.send_interval(), Duration::from_millis(10));
        assert_eq!(config.dispatcher.tick_interval_ms, 100);
    }

    #[test]
    fn test_postgres_requires_url() {
        let err = Config::from_yaml_str("database:\n  backend: postgres\n").unwrap_err();
        assert!(err.to_string().contains("database.url"));
    }

    #[test]
    fn test_memory_backend_needs_no_url() {
        let config = Config::from_yaml_str("database:\n  backend: memory\n").unwrap();
        assert!(config.database.url.is_none());
    }

    #[test]
    fn test_rejects_unknown_log_format() {
        let yaml = "database:\n  backend: memory\nlogging:\n  format: xml\n";
        assert!(Config::from_yaml_str(yaml).is_err());
    }
}
