//! 服务注册中心
//!
//! 维护本进程对所有已知服务的内存视图，驱动心跳与健康检查，并通过
//! [`ServiceStorage`] 与其他进程共享服务记录。
//!
//! 存储后端的任何错误都会被记录并转换为安全默认值：即使后端不可达，
//! 内存缓存仍然可以继续响应服务发现请求（可用性优先于一致性）。

pub mod events;
mod monitor;
pub mod record;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Config, RegistryConfig};
use crate::error::{DiscoveryError, Result, StorageError};
use crate::events::EventBus;
use crate::storage::{ServiceStorage, create_storage};
use monitor::MonitorHandle;

pub use events::RegistryEvent;
pub use record::{
    DEFAULT_PROTOCOL, DEFAULT_VERSION, DiscoverOptions, ServiceRecord, ServiceRegistration,
    ServiceStatus,
};

/// 服务注册中心
///
/// 显式构造并通过参数传递给协作方；克隆得到的是同一个注册中心的另一个句柄。
#[derive(Clone)]
pub struct ServiceRegistry {
    inner: Arc<RegistryInner>,
}

pub(crate) struct RegistryInner {
    config: RegistryConfig,
    storage: Option<Arc<dyn ServiceStorage>>,
    cache: RwLock<HashMap<String, ServiceRecord>>,
    /// 本进程自己注册的服务 ID
    owned: RwLock<HashSet<String>>,
    events: EventBus<RegistryEvent>,
    monitor: parking_lot::Mutex<Option<MonitorHandle>>,
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        if let Some(monitor) = self.monitor.get_mut().take() {
            monitor.cancel();
        }
    }
}

impl ServiceRegistry {
    /// 创建注册中心
    ///
    /// `storage` 为 `None` 时只使用进程内缓存。
    pub fn new(config: RegistryConfig, storage: Option<Arc<dyn ServiceStorage>>) -> Self {
        let events = EventBus::new(config.event_capacity);
        Self {
            inner: Arc::new(RegistryInner {
                config,
                storage,
                cache: RwLock::new(HashMap::new()),
                owned: RwLock::new(HashSet::new()),
                events,
                monitor: parking_lot::Mutex::new(None),
            }),
        }
    }

    /// 根据完整配置创建注册中心及其存储后端
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let storage = create_storage(&config.storage).await?;
        info!(
            backend = storage.backend_name(),
            namespace = %config.storage.namespace,
            "service registry storage ready"
        );
        Ok(Self::new(config.registry.clone(), Some(storage)))
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    pub fn storage(&self) -> Option<&Arc<dyn ServiceStorage>> {
        self.inner.storage.as_ref()
    }

    /// 订阅注册中心事件
    pub fn subscribe(&self) -> async_broadcast::Receiver<RegistryEvent> {
        self.inner.events.subscribe()
    }

    /// 心跳与健康检查任务是否在运行
    pub fn is_monitoring(&self) -> bool {
        self.inner.monitor.lock().is_some()
    }

    /// 本进程注册的服务 ID
    pub async fn owned_ids(&self) -> Vec<String> {
        self.inner.owned.read().await.iter().cloned().collect()
    }

    /// 当前缓存中的全部记录（不访问存储）
    pub async fn cached_services(&self) -> Vec<ServiceRecord> {
        self.inner.cache.read().await.values().cloned().collect()
    }

    /// 注册服务，返回生成的服务 ID
    pub async fn register_service(&self, registration: ServiceRegistration) -> Result<String> {
        let name = registration.name.trim();
        if name.is_empty() {
            return Err(DiscoveryError::MissingServiceName);
        }

        let now = Utc::now();
        let protocol = registration
            .protocol
            .unwrap_or_else(|| DEFAULT_PROTOCOL.to_string());
        let port = registration
            .port
            .unwrap_or_else(|| default_port(&protocol));
        let record = ServiceRecord {
            id: generate_id(name),
            name: name.to_string(),
            version: registration
                .version
                .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            host: registration.host.unwrap_or_else(local_hostname),
            port,
            protocol,
            status: ServiceStatus::Up,
            metadata: registration.metadata,
            last_heartbeat: now,
            registered_at: now,
        };
        let id = record.id.clone();

        // 先标记为自注册再写缓存，存储刷新永远不会把写入中的记录当作他人记录驱逐
        let first_owned = {
            let mut owned = self.inner.owned.write().await;
            owned.insert(id.clone());
            owned.len() == 1
        };

        self.inner
            .cache
            .write()
            .await
            .insert(id.clone(), record.clone());

        if let Some(storage) = &self.inner.storage {
            if let Err(e) = storage.register_service(&record).await {
                self.storage_failed("register_service", &e);
            }
        }

        if first_owned {
            self.start_monitor();
        }

        info!(
            service_id = %id,
            service_name = %record.name,
            address = %format!("{}:{}", record.host, record.port),
            "✅ Service registered"
        );
        self.inner.events.publish(RegistryEvent::Registered(record));
        Ok(id)
    }

    /// 注销服务，返回是否删除了任何内容
    pub async fn deregister_service(&self, id: &str) -> bool {
        let removed_from_cache = self.inner.cache.write().await.remove(id).is_some();

        let removed_from_storage = match &self.inner.storage {
            Some(storage) => match storage.deregister_service(id).await {
                Ok(removed) => removed,
                Err(e) => {
                    self.storage_failed("deregister_service", &e);
                    false
                }
            },
            None => false,
        };

        let (was_owned, none_left) = {
            let mut owned = self.inner.owned.write().await;
            (owned.remove(id), owned.is_empty())
        };
        if was_owned && none_left {
            self.stop_monitor().await;
        }

        let removed = removed_from_cache || removed_from_storage;
        if removed {
            info!(service_id = %id, "Service deregistered");
            self.inner
                .events
                .publish(RegistryEvent::Deregistered { id: id.to_string() });
        }
        removed
    }

    /// 发现服务
    ///
    /// 先把存储中的记录合并到本地缓存，再依次按名称、健康状态、版本和元数据过滤。
    /// `name` 为空时不按名称过滤。结果按注册时间排序。
    pub async fn discover_services(
        &self,
        name: &str,
        options: &DiscoverOptions,
    ) -> Vec<ServiceRecord> {
        self.refresh_from_storage().await;

        let cache = self.inner.cache.read().await;
        let mut services: Vec<ServiceRecord> = cache
            .values()
            .filter(|r| name.is_empty() || r.name == name)
            .filter(|r| options.accepts(r))
            .cloned()
            .collect();
        drop(cache);

        services.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        services
    }

    /// 按 ID 获取服务：先查缓存，未命中时回退到存储并写入缓存
    pub async fn get_service(&self, id: &str) -> Option<ServiceRecord> {
        if let Some(record) = self.inner.cache.read().await.get(id).cloned() {
            return Some(record);
        }

        let storage = self.inner.storage.as_ref()?;
        match storage.get_service(id).await {
            Ok(Some(record)) => {
                self.inner
                    .cache
                    .write()
                    .await
                    .insert(record.id.clone(), record.clone());
                Some(record)
            }
            Ok(None) => None,
            Err(e) => {
                self.storage_failed("get_service", &e);
                None
            }
        }
    }

    /// 合并更新服务元数据（浅合并，补丁中的键覆盖原值）
    pub async fn update_service_metadata(
        &self,
        id: &str,
        patch: HashMap<String, String>,
    ) -> bool {
        if self.get_service(id).await.is_none() {
            return false;
        }

        let record = {
            let mut cache = self.inner.cache.write().await;
            let Some(record) = cache.get_mut(id) else {
                return false;
            };
            record.metadata.extend(patch.clone());
            record.clone()
        };

        if let Some(storage) = &self.inner.storage {
            let owned = self.inner.owned.read().await.contains(id);
            if owned {
                self.write_metadata(storage, &record).await;
            } else {
                // 他人记录只改存储副本的元数据，状态和心跳由其所有者维护
                match storage.get_service(id).await {
                    Ok(Some(mut stored)) => {
                        stored.metadata.extend(patch);
                        self.write_metadata(storage, &stored).await;
                    }
                    Ok(None) => debug!(service_id = %id, "metadata update found no stored record"),
                    Err(e) => self.storage_failed("get_service", &e),
                }
            }
        }

        debug!(service_id = %id, "Service metadata updated");
        self.inner.events.publish(RegistryEvent::Updated(record));
        true
    }

    async fn write_metadata(&self, storage: &Arc<dyn ServiceStorage>, record: &ServiceRecord) {
        match storage.update_service(record).await {
            Ok(true) => {}
            Ok(false) => debug!(service_id = %record.id, "metadata update found no stored record"),
            Err(e) => self.storage_failed("update_service", &e),
        }
    }

    /// 发送心跳：刷新 `last_heartbeat` 并将状态置为 up
    ///
    /// 若存储中已没有该记录（例如被清空），会重新写入。
    pub async fn send_heartbeat(&self, id: &str) -> bool {
        let record = {
            let mut cache = self.inner.cache.write().await;
            let Some(record) = cache.get_mut(id) else {
                return false;
            };
            record.last_heartbeat = Utc::now();
            record.status = ServiceStatus::Up;
            record.clone()
        };

        if let Some(storage) = &self.inner.storage {
            match storage.update_service(&record).await {
                Ok(true) => {}
                Ok(false) => {
                    // 期间已被注销的服务不再写回
                    if !self.inner.cache.read().await.contains_key(id) {
                        return false;
                    }
                    info!(service_id = %id, "stored record missing, re-registering");
                    if let Err(e) = storage.register_service(&record).await {
                        self.storage_failed("register_service", &e);
                    }
                }
                Err(e) => self.storage_failed("update_service", &e),
            }
        }

        debug!(service_id = %id, "💓 Heartbeat sent");
        true
    }

    /// 启动：加载存储中的全部记录，存在自注册服务时启动后台任务
    pub async fn start(&self) {
        if let Some(storage) = &self.inner.storage {
            match storage.get_all_services().await {
                Ok(records) => {
                    let mut cache = self.inner.cache.write().await;
                    for record in records {
                        cache.entry(record.id.clone()).or_insert(record);
                    }
                }
                Err(e) => self.storage_failed("get_all_services", &e),
            }
        }

        if !self.inner.owned.read().await.is_empty() {
            self.start_monitor();
        }

        info!("service discovery started");
        self.inner.events.publish(RegistryEvent::Started);
    }

    /// 优雅关闭：停止后台任务并注销所有自注册服务
    pub async fn stop(&self) {
        self.stop_monitor().await;

        let owned = self.owned_ids().await;
        futures::future::join_all(owned.iter().map(|id| self.deregister_service(id))).await;

        info!(deregistered = owned.len(), "🛑 service discovery stopped");
        self.inner.events.publish(RegistryEvent::Stopped);
    }

    /// 执行一次健康检查
    ///
    /// 对非自注册服务：心跳超时且为 up 时置为 down，心跳恢复且为 down 时置为 up。
    /// 自注册服务由心跳任务负责，不参与检查。
    pub async fn run_health_check(&self) {
        self.refresh_from_storage().await;

        let owned = self.inner.owned.read().await.clone();
        let threshold = self.inner.config.timeout_threshold();
        let now = Utc::now();

        let mut transitions = Vec::new();
        {
            let mut cache = self.inner.cache.write().await;
            for record in cache.values_mut() {
                if owned.contains(&record.id) {
                    continue;
                }
                let stale = record.is_stale(now, threshold);
                match (stale, record.status) {
                    (true, ServiceStatus::Up) => {
                        record.status = ServiceStatus::Down;
                        transitions.push(RegistryEvent::Down(record.clone()));
                    }
                    (false, ServiceStatus::Down) => {
                        record.status = ServiceStatus::Up;
                        transitions.push(RegistryEvent::Up(record.clone()));
                    }
                    _ => {}
                }
            }
        }

        for event in transitions {
            match &event {
                RegistryEvent::Down(r) => warn!(
                    service_id = %r.id,
                    service_name = %r.name,
                    last_heartbeat = %r.last_heartbeat,
                    "service heartbeat timed out, marked down"
                ),
                RegistryEvent::Up(r) => info!(
                    service_id = %r.id,
                    service_name = %r.name,
                    "service heartbeat resumed, marked up"
                ),
                _ => {}
            }
            self.inner.events.publish(event);
        }
    }

    /// 为所有自注册服务发送心跳
    pub(crate) async fn heartbeat_owned(&self) {
        for id in self.owned_ids().await {
            self.send_heartbeat(&id).await;
        }
    }

    /// 把存储中的记录合并进缓存
    ///
    /// - 缓存中没有的记录直接加入；
    /// - 其他进程的记录若存储中的心跳更新，则覆盖缓存内容但保留本地判定的状态，
    ///   由下一次健康检查完成状态切换并发出事件；
    /// - 存储列表成功返回时，已从存储消失的非自注册记录从缓存中移除；
    /// - 自注册记录从不被存储内容覆盖。
    async fn refresh_from_storage(&self) {
        let Some(storage) = &self.inner.storage else {
            return;
        };
        let stored = match storage.get_all_services().await {
            Ok(records) => records,
            Err(e) => {
                self.storage_failed("get_all_services", &e);
                return;
            }
        };

        let stored_ids: HashSet<String> = stored.iter().map(|r| r.id.clone()).collect();

        // 加锁顺序：cache -> owned。注册先写 owned 再写 cache，
        // 因此这里看到的缓存条目若属于本进程，必然已在 owned 中
        let mut cache = self.inner.cache.write().await;
        let owned = self.inner.owned.read().await;
        for record in stored {
            if owned.contains(&record.id) {
                continue;
            }
            match cache.get_mut(&record.id) {
                None => {
                    cache.insert(record.id.clone(), record);
                }
                Some(cached) if record.last_heartbeat > cached.last_heartbeat => {
                    let status = cached.status;
                    *cached = record;
                    cached.status = status;
                }
                Some(_) => {}
            }
        }
        cache.retain(|id, _| owned.contains(id) || stored_ids.contains(id));
    }

    fn start_monitor(&self) {
        let mut monitor = self.inner.monitor.lock();
        if monitor.is_none() {
            *monitor = Some(MonitorHandle::spawn(&self.inner));
        }
    }

    async fn stop_monitor(&self) {
        let monitor = self.inner.monitor.lock().take();
        if let Some(monitor) = monitor {
            monitor.shutdown().await;
        }
    }

    fn storage_failed(&self, operation: &'static str, error: &StorageError) {
        let backend = self
            .inner
            .storage
            .as_ref()
            .map_or("none", |s| s.backend_name());
        warn!(
            operation,
            backend,
            error = %error,
            "storage operation failed, serving from cache"
        );
    }
}

fn generate_id(name: &str) -> String {
    format!("{}-{}", name, Uuid::new_v4().simple())
}

fn default_port(protocol: &str) -> u16 {
    if protocol.eq_ignore_ascii_case("https") {
        443
    } else {
        80
    }
}

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
