//! 服务发现客户端
//!
//! 在 [`ServiceRegistry`] 之上提供负载均衡和 URL 构造。找不到健康实例时返回
//! `None`，不会把“未找到”当作错误。

pub mod load_balancer;

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::registry::{DiscoverOptions, ServiceRecord, ServiceRegistration, ServiceRegistry};

pub use load_balancer::{LoadBalanceStrategy, LoadBalancer};

/// 实例选择参数
#[derive(Debug, Clone, Default)]
pub struct InstanceQuery {
    pub strategy: LoadBalanceStrategy,
    /// 版本 / 元数据过滤；`only_healthy` 始终视为 true
    pub filter: DiscoverOptions,
    /// 一致性哈希使用的键
    pub hash_key: Option<String>,
}

impl InstanceQuery {
    pub fn new(strategy: LoadBalanceStrategy) -> Self {
        Self {
            strategy,
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: DiscoverOptions) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_hash_key(mut self, key: impl Into<String>) -> Self {
        self.hash_key = Some(key.into());
        self
    }
}

/// 服务发现客户端
pub struct DiscoveryClient {
    registry: ServiceRegistry,
    balancer: LoadBalancer,
    own_id: RwLock<Option<String>>,
}

impl DiscoveryClient {
    pub fn new(registry: ServiceRegistry) -> Self {
        Self {
            registry,
            balancer: LoadBalancer::new(),
            own_id: RwLock::new(None),
        }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// 本客户端注册的服务 ID
    pub fn own_id(&self) -> Option<String> {
        self.own_id.read().clone()
    }

    /// 注册本服务并记住其 ID
    pub async fn register(&self, registration: ServiceRegistration) -> Result<String> {
        let id = self.registry.register_service(registration).await?;
        *self.own_id.write() = Some(id.clone());
        Ok(id)
    }

    /// 注销本服务
    pub async fn deregister(&self) -> bool {
        let id = self.own_id.write().take();
        match id {
            Some(id) => self.registry.deregister_service(&id).await,
            None => false,
        }
    }

    pub async fn discover(&self, name: &str, options: &DiscoverOptions) -> Vec<ServiceRecord> {
        self.registry.discover_services(name, options).await
    }

    pub async fn get_service(&self, id: &str) -> Option<ServiceRecord> {
        self.registry.get_service(id).await
    }

    pub async fn update_metadata(&self, patch: HashMap<String, String>) -> bool {
        let Some(id) = self.own_id() else {
            return false;
        };
        self.registry.update_service_metadata(&id, patch).await
    }

    /// 按负载均衡策略选择一个健康实例
    pub async fn get_service_instance(
        &self,
        name: &str,
        query: &InstanceQuery,
    ) -> Option<ServiceRecord> {
        let filter = DiscoverOptions {
            only_healthy: true,
            ..query.filter.clone()
        };
        let candidates = self.registry.discover_services(name, &filter).await;
        if candidates.is_empty() {
            debug!(service_name = %name, "no healthy instance available");
        }
        self.balancer
            .select(name, candidates, query.strategy, query.hash_key.as_deref())
    }

    /// 构造服务地址：`protocol://host:port/path`，`path` 保证以 `/` 开头
    pub async fn get_service_url(
        &self,
        name: &str,
        path: &str,
        query: &InstanceQuery,
    ) -> Option<String> {
        let instance = self.get_service_instance(name, query).await?;
        Some(format!("{}{}", instance.base_url(), normalize_path(path)))
    }

    /// 最近一次为该服务名取得的候选列表
    pub fn last_candidates(&self, name: &str) -> Vec<ServiceRecord> {
        self.balancer.last_candidates(name)
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
