//! 熔断器注册表
//!
//! 按名称共享熔断器：同一进程内所有调用方对同一个依赖使用同一个熔断器实例。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::config::{BreakerOptions, CircuitBreakerConfig};
use crate::config::Config;
use super::observer::BreakerObserver;
use super::state::BreakerMetrics;
use super::CircuitBreaker;

/// 熔断器注册表
pub struct CircuitBreakerRegistry {
    defaults: CircuitBreakerConfig,
    observers: Vec<Arc<dyn BreakerObserver>>,
    breakers: RwLock<HashMap<String, CircuitBreaker>>,
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreakerRegistry {
    pub fn new(defaults: CircuitBreakerConfig) -> Self {
        Self {
            defaults,
            observers: Vec::new(),
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// 使用配置文件中的 `[breaker]` 段作为默认配置
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.breaker.to_breaker_config())
    }

    /// 添加附加到之后创建的每个熔断器上的观察者
    pub fn with_observer(mut self, observer: Arc<dyn BreakerObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn defaults(&self) -> &CircuitBreakerConfig {
        &self.defaults
    }

    /// 获取已有熔断器，不存在时按 `options` 创建
    ///
    /// 名称已存在时忽略 `options`，返回已有实例。
    pub fn get_or_create(&self, name: &str, options: BreakerOptions) -> CircuitBreaker {
        if let Some(breaker) = self.breakers.read().get(name) {
            return breaker.clone();
        }

        let mut breakers = self.breakers.write();
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                let config = self.defaults.merged(&options);
                let mut observers = self.observers.clone();
                observers.extend(options.observer);
                debug!(breaker = %name, ?config, "creating circuit breaker");
                CircuitBreaker::with_observers(name, config, observers)
            })
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<CircuitBreaker> {
        self.breakers.read().get(name).cloned()
    }

    /// 移除熔断器，已持有的句柄仍然可用
    pub fn remove(&self, name: &str) -> Option<CircuitBreaker> {
        self.breakers.write().remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.breakers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.read().is_empty()
    }

    /// 重置所有熔断器
    pub fn reset_all(&self) {
        let breakers: Vec<CircuitBreaker> = self.breakers.read().values().cloned().collect();
        for breaker in breakers {
            breaker.reset();
        }
    }

    /// 所有熔断器的指标快照，按名称排序
    pub fn all_metrics(&self) -> Vec<BreakerMetrics> {
        let breakers: Vec<CircuitBreaker> = self.breakers.read().values().cloned().collect();
        let mut metrics: Vec<BreakerMetrics> = breakers.iter().map(CircuitBreaker::metrics).collect();
        metrics.sort_by(|a, b| a.name.cmp(&b.name));
        metrics
    }
}
