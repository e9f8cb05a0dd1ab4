//! 熔断器配置

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::observer::BreakerObserver;

/// 熔断器配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// 连续失败多少次后打开熔断器
    pub failure_threshold: u32,
    /// 打开后多久允许半开探测
    pub reset_timeout: Duration,
    /// 半开状态下连续成功多少次后关闭熔断器
    pub half_open_success_threshold: u32,
    /// 单次调用超时，`Duration::ZERO` 表示不限时
    pub timeout: Duration,
    /// 半开状态下允许同时进行的探测调用数，0 表示不限制
    pub half_open_max_probes: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            half_open_success_threshold: 2,
            timeout: Duration::from_secs(10),
            half_open_max_probes: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// 用调用方给出的选项覆盖默认值
    pub fn merged(&self, options: &BreakerOptions) -> Self {
        Self {
            failure_threshold: options.failure_threshold.unwrap_or(self.failure_threshold),
            reset_timeout: options.reset_timeout.unwrap_or(self.reset_timeout),
            half_open_success_threshold: options
                .half_open_success_threshold
                .unwrap_or(self.half_open_success_threshold),
            timeout: options.timeout.unwrap_or(self.timeout),
            half_open_max_probes: options
                .half_open_max_probes
                .unwrap_or(self.half_open_max_probes),
        }
    }
}

/// 创建熔断器时的可选参数，未设置的字段取注册表默认值
#[derive(Clone, Default)]
pub struct BreakerOptions {
    pub failure_threshold: Option<u32>,
    pub reset_timeout: Option<Duration>,
    pub half_open_success_threshold: Option<u32>,
    pub timeout: Option<Duration>,
    pub half_open_max_probes: Option<usize>,
    /// 仅附加到该熔断器的观察者
    pub observer: Option<Arc<dyn BreakerObserver>>,
}

impl fmt::Debug for BreakerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerOptions")
            .field("failure_threshold", &self.failure_threshold)
            .field("reset_timeout", &self.reset_timeout)
            .field("half_open_success_threshold", &self.half_open_success_threshold)
            .field("timeout", &self.timeout)
            .field("half_open_max_probes", &self.half_open_max_probes)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl BreakerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = Some(threshold);
        self
    }

    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = Some(timeout);
        self
    }

    pub fn half_open_success_threshold(mut self, threshold: u32) -> Self {
        self.half_open_success_threshold = Some(threshold);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn half_open_max_probes(mut self, probes: usize) -> Self {
        self.half_open_max_probes = Some(probes);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn BreakerObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
}
