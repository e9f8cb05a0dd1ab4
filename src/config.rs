//! 配置模块
//!
//! 支持从 TOML 文件加载，并允许通过环境变量覆盖常用参数：
//! - `DISCOVERY_HEARTBEAT_INTERVAL_MS`：心跳间隔（毫秒）
//! - `DISCOVERY_TIMEOUT_THRESHOLD_MS`：心跳超时阈值（毫秒）
//! - `DISCOVERY_STORAGE_BACKEND`：存储后端（memory / redis / etcd）
//! - `DISCOVERY_STORAGE_URL`：存储地址（Redis URL，或逗号分隔的 etcd endpoints）
//! - `DISCOVERY_NAMESPACE`：存储命名空间

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::breaker::CircuitBreakerConfig;
use crate::error::DiscoveryError;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub registry: RegistryConfig,
    pub storage: StorageConfig,
    pub breaker: BreakerSection,
    pub logging: LoggingConfig,
}

/// 注册中心配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// 心跳间隔（毫秒），默认 30 秒
    pub heartbeat_interval_ms: u64,
    /// 心跳超时阈值（毫秒），默认为心跳间隔的 3 倍
    pub timeout_threshold_ms: u64,
    /// 健康检查间隔（毫秒），未设置时与心跳间隔一致
    pub health_check_interval_ms: Option<u64>,
    /// 事件通道容量
    pub event_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 30_000,
            timeout_threshold_ms: 90_000,
            health_check_interval_ms: None,
            event_capacity: 256,
        }
    }
}

impl RegistryConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn timeout_threshold(&self) -> Duration {
        Duration::from_millis(self.timeout_threshold_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(
            self.health_check_interval_ms
                .unwrap_or(self.heartbeat_interval_ms),
        )
    }

    /// 设置心跳间隔
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = duration_ms(interval);
        self
    }

    /// 设置心跳超时阈值
    pub fn with_timeout_threshold(mut self, threshold: Duration) -> Self {
        self.timeout_threshold_ms = duration_ms(threshold);
        self
    }

    /// 设置健康检查间隔
    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval_ms = Some(duration_ms(interval));
        self
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// 存储后端类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Redis,
    Etcd,
}

impl FromStr for StorageBackend {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "in-memory" | "inmemory" => Ok(StorageBackend::Memory),
            "redis" => Ok(StorageBackend::Redis),
            "etcd" => Ok(StorageBackend::Etcd),
            other => Err(DiscoveryError::config(format!(
                "unknown storage backend: {other}"
            ))),
        }
    }
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Memory => "memory",
            StorageBackend::Redis => "redis",
            StorageBackend::Etcd => "etcd",
        }
    }
}

/// 存储配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Redis 连接地址，例如 `redis://127.0.0.1:6379`
    pub url: Option<String>,
    /// etcd endpoints
    pub endpoints: Vec<String>,
    /// 键前缀 / 命名空间
    pub namespace: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            url: None,
            endpoints: Vec::new(),
            namespace: "flare".to_string(),
        }
    }
}

/// 熔断器默认参数
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerSection {
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
    pub half_open_success_threshold: u32,
    pub timeout_ms: u64,
    pub half_open_max_probes: usize,
}

impl Default for BreakerSection {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            failure_threshold: defaults.failure_threshold,
            reset_timeout_ms: duration_ms(defaults.reset_timeout),
            half_open_success_threshold: defaults.half_open_success_threshold,
            timeout_ms: duration_ms(defaults.timeout),
            half_open_max_probes: defaults.half_open_max_probes,
        }
    }
}

impl BreakerSection {
    pub fn to_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            reset_timeout: Duration::from_millis(self.reset_timeout_ms),
            half_open_success_threshold: self.half_open_success_threshold,
            timeout: Duration::from_millis(self.timeout_ms),
            half_open_max_probes: self.half_open_max_probes,
        }
    }
}

/// 日志输出格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 默认日志级别（`RUST_LOG` 优先）
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// 使用进程环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) -> Result<(), DiscoveryError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// 使用给定的查找函数覆盖配置
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), DiscoveryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DISCOVERY_HEARTBEAT_INTERVAL_MS") {
            self.registry.heartbeat_interval_ms = parse_ms("DISCOVERY_HEARTBEAT_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("DISCOVERY_TIMEOUT_THRESHOLD_MS") {
            self.registry.timeout_threshold_ms = parse_ms("DISCOVERY_TIMEOUT_THRESHOLD_MS", &v)?;
        }
        if let Some(v) = lookup("DISCOVERY_STORAGE_BACKEND") {
            self.storage.backend = v.parse()?;
        }
        if let Some(v) = lookup("DISCOVERY_STORAGE_URL") {
            match self.storage.backend {
                StorageBackend::Etcd => {
                    self.storage.endpoints = v
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect();
                }
                _ => self.storage.url = Some(v),
            }
        }
        if let Some(v) = lookup("DISCOVERY_NAMESPACE") {
            self.storage.namespace = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), DiscoveryError> {
        if self.registry.heartbeat_interval_ms == 0 {
            return Err(DiscoveryError::config("heartbeat_interval_ms must be > 0"));
        }
        if self.registry.health_check_interval_ms == Some(0) {
            return Err(DiscoveryError::config("health_check_interval_ms must be > 0"));
        }
        if self.registry.timeout_threshold_ms == 0 {
            return Err(DiscoveryError::config("timeout_threshold_ms must be > 0"));
        }
        if self.breaker.failure_threshold == 0 || self.breaker.half_open_success_threshold == 0 {
            return Err(DiscoveryError::config("breaker thresholds must be > 0"));
        }
        Ok(())
    }
}

fn parse_ms(key: &str, value: &str) -> Result<u64, DiscoveryError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| DiscoveryError::config(format!("{key}: invalid value '{value}': {e}")))
}
