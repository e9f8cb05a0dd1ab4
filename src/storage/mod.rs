//! 服务记录存储模块
//!
//! 支持多种存储后端：内存、Redis（键值 + 索引集合）和 etcd（每个服务一个文档）。
//! 所有后端实现同一个 [`ServiceStorage`] trait，可互相替换而无需修改注册中心。

pub mod memory;

#[cfg(feature = "etcd-store")]
pub mod etcd;
#[cfg(feature = "redis-store")]
pub mod redis;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{StorageError, StorageResult};
use crate::registry::ServiceRecord;

pub use memory::MemoryStorage;

#[cfg(feature = "etcd-store")]
pub use self::etcd::EtcdStorage;
#[cfg(feature = "redis-store")]
pub use self::redis::RedisStorage;

/// 服务记录存储 trait
///
/// 注册、注销和清空操作必须把“记录 + 索引”作为一个原子单元写入，
/// 调用方永远不会观察到孤立的索引项或未建索引的记录。
#[async_trait]
pub trait ServiceStorage: Send + Sync {
    /// 写入（或覆盖）服务记录
    async fn register_service(&self, record: &ServiceRecord) -> StorageResult<()>;

    /// 删除服务记录，返回是否确实删除了记录
    async fn deregister_service(&self, id: &str) -> StorageResult<bool>;

    /// 按 ID 读取服务记录
    async fn get_service(&self, id: &str) -> StorageResult<Option<ServiceRecord>>;

    /// 更新已存在的服务记录，记录不存在时返回 `false`
    async fn update_service(&self, record: &ServiceRecord) -> StorageResult<bool>;

    /// 读取全部服务记录
    async fn get_all_services(&self) -> StorageResult<Vec<ServiceRecord>>;

    /// 删除全部服务记录
    async fn clear_services(&self) -> StorageResult<()>;

    /// 后端名称，用于日志
    fn backend_name(&self) -> &'static str;
}

/// 根据配置创建存储后端
pub async fn create_storage(config: &StorageConfig) -> StorageResult<Arc<dyn ServiceStorage>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStorage::new())),
        StorageBackend::Redis => create_redis(config).await,
        StorageBackend::Etcd => create_etcd(config).await,
    }
}

#[cfg(feature = "redis-store")]
async fn create_redis(config: &StorageConfig) -> StorageResult<Arc<dyn ServiceStorage>> {
    let url = config
        .url
        .as_deref()
        .ok_or_else(|| StorageError::connection("redis url not configured"))?;
    let storage = RedisStorage::connect(url, config.namespace.clone()).await?;
    Ok(Arc::new(storage))
}

#[cfg(not(feature = "redis-store"))]
async fn create_redis(_config: &StorageConfig) -> StorageResult<Arc<dyn ServiceStorage>> {
    Err(StorageError::Unsupported("redis".to_string()))
}

#[cfg(feature = "etcd-store")]
async fn create_etcd(config: &StorageConfig) -> StorageResult<Arc<dyn ServiceStorage>> {
    if config.endpoints.is_empty() {
        return Err(StorageError::connection("etcd endpoints not configured"));
    }
    let storage = EtcdStorage::connect(&config.endpoints, config.namespace.clone()).await?;
    Ok(Arc::new(storage))
}

#[cfg(not(feature = "etcd-store"))]
async fn create_etcd(_config: &StorageConfig) -> StorageResult<Arc<dyn ServiceStorage>> {
    Err(StorageError::Unsupported("etcd".to_string()))
}
