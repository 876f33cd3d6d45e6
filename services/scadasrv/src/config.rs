//! Service configuration
//!
//! Layered with Figment: built-in defaults, then an optional YAML/TOML/JSON
//! file, then `SCADASRV_*` environment variables (`__` separates nesting
//! levels, e.g. `SCADASRV_PRINTSRV__PORT=10101`).

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, ScadaError};
use crate::printsrv::codec::FrameCodec;
use crate::runtime::HealthPolicyConfig;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "SCADASRV_";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub printsrv: PrintSrvConfig,
}

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name, also the log subdirectory
    #[serde(default = "default_service_name")]
    pub name: String,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,

    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Root log directory
    #[serde(default = "default_log_dir")]
    pub dir: String,

    /// Write daily-rolling log files
    #[serde(default)]
    pub file: bool,

    /// JSON format for the file sink
    #[serde(default)]
    pub json: bool,
}

/// PrintSrv endpoint and bridge behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintSrvConfig {
    #[serde(default = "default_printsrv_host")]
    pub host: String,

    #[serde(default = "default_printsrv_port")]
    pub port: u16,

    /// Device name sent with every command
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Single-byte charset label for frame bodies
    #[serde(default = "default_charset")]
    pub charset: String,

    /// TCP connect deadline; request I/O has none
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_pool_size")]
    pub size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Scan cycle interval
    #[serde(default = "default_polling_interval_ms")]
    pub interval_ms: u64,
}

/// Health policy timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_recovery_check_interval_ms")]
    pub recovery_check_interval_ms: u64,
}

// Default value functions
fn default_service_name() -> String {
    "scadasrv".to_string()
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_printsrv_host() -> String {
    "127.0.0.1".to_string()
}

fn default_printsrv_port() -> u16 {
    10101
}

fn default_device_name() -> String {
    "Line".to_string()
}

fn default_charset() -> String {
    crate::printsrv::codec::DEFAULT_CHARSET.to_string()
}

fn default_connect_timeout_ms() -> u64 {
    3000
}

fn default_pool_size() -> usize {
    2
}

fn default_polling_interval_ms() -> u64 {
    5000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_recovery_check_interval_ms() -> u64 {
    60_000
}

// Default implementations
impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: default_log_dir(),
            file: false,
            json: false,
        }
    }
}

impl Default for PrintSrvConfig {
    fn default() -> Self {
        Self {
            host: default_printsrv_host(),
            port: default_printsrv_port(),
            device_name: default_device_name(),
            charset: default_charset(),
            connect_timeout_ms: default_connect_timeout_ms(),
            pool: PoolConfig::default(),
            polling: PollingConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: default_pool_size(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_polling_interval_ms(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            recovery_check_interval_ms: default_recovery_check_interval_ms(),
        }
    }
}

impl AppConfig {
    /// Load defaults, the optional file and `SCADASRV_*` variables, then validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn load_with_env(path: Option<&Path>, env: Env) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(AppConfig::default()));

        if let Some(path) = path {
            if !path.exists() {
                return Err(ScadaError::config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }

            let extension = path
                .extension()
                .and_then(|s| s.to_str())
                .ok_or_else(|| ScadaError::config("Invalid file extension"))?;

            figment = match extension {
                "json" => figment.merge(Json::file(path)),
                "toml" => figment.merge(Toml::file(path)),
                "yaml" | "yml" => figment.merge(Yaml::file(path)),
                _ => {
                    return Err(ScadaError::config(format!(
                        "Unsupported config format: {}",
                        extension
                    )))
                },
            };
            debug!("Config file: {}", path.display());
        }

        let config: AppConfig = figment
            .merge(env)
            .extract()
            .map_err(|e| ScadaError::config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and cross-field constraints
    pub fn validate(&self) -> Result<()> {
        let p = &self.printsrv;

        if p.host.trim().is_empty() {
            return Err(ScadaError::config("printsrv.host must not be empty"));
        }
        if p.port == 0 {
            return Err(ScadaError::config("printsrv.port must not be 0"));
        }
        if p.device_name.trim().is_empty() {
            return Err(ScadaError::config("printsrv.device_name must not be empty"));
        }
        if p.connect_timeout_ms < 1 {
            return Err(ScadaError::config("printsrv.connect_timeout_ms must be >= 1"));
        }
        if p.pool.size < 1 {
            return Err(ScadaError::config("printsrv.pool.size must be >= 1"));
        }
        if p.polling.interval_ms < 1 {
            return Err(ScadaError::config(
                "printsrv.polling.interval_ms must be >= 1",
            ));
        }
        if p.retry.max_attempts < 1 {
            return Err(ScadaError::config("printsrv.retry.max_attempts must be >= 1"));
        }
        if p.retry.initial_delay_ms > p.retry.max_delay_ms {
            return Err(ScadaError::config(format!(
                "printsrv.retry.initial_delay_ms ({}) exceeds max_delay_ms ({})",
                p.retry.initial_delay_ms, p.retry.max_delay_ms
            )));
        }
        FrameCodec::for_label(&p.charset)?;

        Ok(())
    }

    /// HTTP listen address, `host:port`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.service.api.host, self.service.api.port)
    }
}

impl PrintSrvConfig {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling.interval_ms)
    }

    pub fn health_policy(&self) -> HealthPolicyConfig {
        HealthPolicyConfig::from_config(
            self.retry.max_attempts,
            self.retry.initial_delay_ms,
            self.retry.max_delay_ms,
            self.retry.recovery_check_interval_ms,
        )
    }
}
