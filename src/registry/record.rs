//! 服务记录定义

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_VERSION: &str = "1.0.0";
pub const DEFAULT_PROTOCOL: &str = "http";

/// 服务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Up,
    Down,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Up => "up",
            ServiceStatus::Down => "down",
        }
    }
}

/// 服务记录
///
/// 描述一个正在运行的服务实例。`id` 全局唯一，`name` 可被多个实例共享。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub id: String,
    pub name: String,
    pub version: String,
    pub host: String,
    pub port: u16,
    pub protocol: String,
    pub status: ServiceStatus,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub last_heartbeat: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
}

impl ServiceRecord {
    pub fn is_up(&self) -> bool {
        self.status == ServiceStatus::Up
    }

    /// 检查是否匹配全部元数据（逻辑与，值精确相等）
    pub fn matches_metadata(&self, filters: &HashMap<String, String>) -> bool {
        filters
            .iter()
            .all(|(key, value)| self.metadata.get(key) == Some(value))
    }

    /// 检查是否匹配版本
    pub fn matches_version(&self, version: Option<&str>) -> bool {
        version.is_none_or(|v| self.version == v)
    }

    /// 自上次心跳以来是否已超过阈值
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: std::time::Duration) -> bool {
        let threshold = chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::MAX);
        now.signed_duration_since(self.last_heartbeat) > threshold
    }

    /// 基础地址，格式：protocol://host:port
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

/// 服务注册参数
///
/// 只有 `name` 是必填项，其余字段在注册时补齐默认值。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceRegistration {
    pub name: String,
    pub version: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub protocol: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ServiceRegistration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// 服务发现过滤条件
#[derive(Debug, Clone)]
pub struct DiscoverOptions {
    /// 只返回状态为 up 的实例（默认 true）
    pub only_healthy: bool,
    pub version: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl Default for DiscoverOptions {
    fn default() -> Self {
        Self {
            only_healthy: true,
            version: None,
            metadata: HashMap::new(),
        }
    }
}

impl DiscoverOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include_unhealthy(mut self) -> Self {
        self.only_healthy = false;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// 判断记录是否满足过滤条件（不含名称）
    pub fn accepts(&self, record: &ServiceRecord) -> bool {
        (!self.only_healthy || record.is_up())
            && record.matches_version(self.version.as_deref())
            && record.matches_metadata(&self.metadata)
    }
}
