//! 存储后端共享测试用例
//!
//! 每个后端都应通过同一组行为测试，保证注册中心可以在不同后端之间切换。

#![allow(dead_code)]

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use flare_discovery_core::{
    MemoryStorage, ServiceRecord, ServiceStatus, ServiceStorage, StorageError, StorageResult,
};

/// 构造测试用服务记录
pub fn record(id: &str, name: &str) -> ServiceRecord {
    let now = Utc::now();
    let mut metadata = HashMap::new();
    metadata.insert("env".to_string(), "test".to_string());

    ServiceRecord {
        id: id.to_string(),
        name: name.to_string(),
        version: "1.0.0".to_string(),
        host: "127.0.0.1".to_string(),
        port: 8080,
        protocol: "http".to_string(),
        status: ServiceStatus::Up,
        metadata,
        last_heartbeat: now,
        registered_at: now,
    }
}

/// 心跳停在 `secs_ago` 秒之前的记录
pub fn stale_record(id: &str, name: &str, secs_ago: i64) -> ServiceRecord {
    let mut r = record(id, name);
    let then = Utc::now() - ChronoDuration::seconds(secs_ago);
    r.last_heartbeat = then;
    r.registered_at = then;
    r
}

/// 注册写入前先等待一段时间的内存存储
pub struct SlowRegisterStorage {
    pub inner: MemoryStorage,
    pub delay: Duration,
}

impl SlowRegisterStorage {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryStorage::new(),
            delay,
        }
    }
}

#[async_trait]
impl ServiceStorage for SlowRegisterStorage {
    async fn register_service(&self, record: &ServiceRecord) -> StorageResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.register_service(record).await
    }

    async fn deregister_service(&self, id: &str) -> StorageResult<bool> {
        self.inner.deregister_service(id).await
    }

    async fn get_service(&self, id: &str) -> StorageResult<Option<ServiceRecord>> {
        self.inner.get_service(id).await
    }

    async fn update_service(&self, record: &ServiceRecord) -> StorageResult<bool> {
        self.inner.update_service(record).await
    }

    async fn get_all_services(&self) -> StorageResult<Vec<ServiceRecord>> {
        self.inner.get_all_services().await
    }

    async fn clear_services(&self) -> StorageResult<()> {
        self.inner.clear_services().await
    }

    fn backend_name(&self) -> &'static str {
        "slow-memory"
    }
}

/// 所有操作都返回连接错误的存储
pub struct UnreachableStorage;

fn offline<T>() -> StorageResult<T> {
    Err(StorageError::connection("backend unreachable"))
}

#[async_trait]
impl ServiceStorage for UnreachableStorage {
    async fn register_service(&self, _record: &ServiceRecord) -> StorageResult<()> {
        offline()
    }

    async fn deregister_service(&self, _id: &str) -> StorageResult<bool> {
        offline()
    }

    async fn get_service(&self, _id: &str) -> StorageResult<Option<ServiceRecord>> {
        offline()
    }

    async fn update_service(&self, _record: &ServiceRecord) -> StorageResult<bool> {
        offline()
    }

    async fn get_all_services(&self) -> StorageResult<Vec<ServiceRecord>> {
        offline()
    }

    async fn clear_services(&self) -> StorageResult<()> {
        offline()
    }

    fn backend_name(&self) -> &'static str {
        "unreachable"
    }
}

pub async fn register_then_get(storage: &dyn ServiceStorage) {
    let r = record("api-1", "api");
    storage.register_service(&r).await.unwrap();

    let loaded = storage.get_service("api-1").await.unwrap();
    assert_eq!(loaded.as_ref().map(|l| &l.id), Some(&r.id));
    let loaded = loaded.unwrap();
    assert_eq!(loaded.name, "api");
    assert_eq!(loaded.port, 8080);
    assert_eq!(loaded.metadata.get("env").map(String::as_str), Some("test"));
    assert_eq!(loaded.last_heartbeat, r.last_heartbeat);

    assert!(storage.get_service("missing").await.unwrap().is_none());
}

pub async fn register_overwrites(storage: &dyn ServiceStorage) {
    let mut r = record("api-1", "api");
    storage.register_service(&r).await.unwrap();
    r.port = 9090;
    storage.register_service(&r).await.unwrap();

    let all = storage.get_all_services().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].port, 9090);
}

pub async fn deregister_reports_removal(storage: &dyn ServiceStorage) {
    storage.register_service(&record("api-1", "api")).await.unwrap();

    assert!(storage.deregister_service("api-1").await.unwrap());
    assert!(!storage.deregister_service("api-1").await.unwrap());
    assert!(storage.get_service("api-1").await.unwrap().is_none());
    assert!(storage.get_all_services().await.unwrap().is_empty());
}

pub async fn update_requires_existing_record(storage: &dyn ServiceStorage) {
    let mut r = record("api-1", "api");
    assert!(!storage.update_service(&r).await.unwrap());
    assert!(storage.get_service("api-1").await.unwrap().is_none());

    storage.register_service(&r).await.unwrap();
    r.metadata.insert("zone".to_string(), "b".to_string());
    assert!(storage.update_service(&r).await.unwrap());

    let loaded = storage.get_service("api-1").await.unwrap().unwrap();
    assert_eq!(loaded.metadata.get("zone").map(String::as_str), Some("b"));
}

pub async fn get_all_and_clear(storage: &dyn ServiceStorage) {
    for (id, name) in [("api-1", "api"), ("api-2", "api"), ("web-1", "web")] {
        storage.register_service(&record(id, name)).await.unwrap();
    }

    let mut ids: Vec<String> = storage
        .get_all_services()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["api-1", "api-2", "web-1"]);

    storage.clear_services().await.unwrap();
    assert!(storage.get_all_services().await.unwrap().is_empty());
    assert!(storage.get_service("web-1").await.unwrap().is_none());
}

/// 依次运行全部用例，每个用例前清空存储
pub async fn run_all(storage: &dyn ServiceStorage) {
    storage.clear_services().await.unwrap();
    register_then_get(storage).await;
    storage.clear_services().await.unwrap();
    register_overwrites(storage).await;
    storage.clear_services().await.unwrap();
    deregister_reports_removal(storage).await;
    storage.clear_services().await.unwrap();
    update_requires_existing_record(storage).await;
    storage.clear_services().await.unwrap();
    get_all_and_clear(storage).await;
}
