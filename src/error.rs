//! 错误处理模块
//!
//! 注册中心与存储后端的统一错误类型。熔断器的错误类型位于 [`crate::breaker::BreakerError`]。

use thiserror::Error;

/// 存储后端错误
///
/// 在存储适配器边界产生；注册中心捕获后记录日志并转换为安全默认值，不会向调用方传播。
#[derive(Error, Debug)]
pub enum StorageError {
    #[cfg(feature = "redis-store")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[cfg(feature = "etcd-store")]
    #[error("etcd error: {0}")]
    Etcd(#[from] etcd_client::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("connection failed: {0}")]
    Connection(String),

    /// 配置的后端未编译进当前构建
    #[error("storage backend '{0}' is not enabled in this build")]
    Unsupported(String),
}

impl StorageError {
    /// 创建连接失败错误
    pub fn connection(reason: impl Into<String>) -> Self {
        StorageError::Connection(reason.into())
    }
}

/// 注册中心错误
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// 校验错误：服务名缺失，在任何副作用之前返回
    #[error("service name is required")]
    MissingServiceName,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl DiscoveryError {
    /// 创建配置错误
    pub fn config(msg: impl Into<String>) -> Self {
        DiscoveryError::Config(msg.into())
    }

    /// 是否为校验错误
    pub fn is_validation(&self) -> bool {
        matches!(self, DiscoveryError::MissingServiceName)
    }
}

/// 存储操作结果类型
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// 注册中心操作结果类型
pub type Result<T> = std::result::Result<T, DiscoveryError>;
