//! 熔断器观察者
//!
//! 观察者在状态锁之外被调用，可用于日志、指标或告警。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::state::CircuitState;

/// 失败类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 被包装调用返回错误
    Error,
    /// 调用超时
    Timeout,
}

/// 熔断器观察者，所有方法默认不做任何事
pub trait BreakerObserver: Send + Sync {
    fn on_state_change(&self, _name: &str, _from: CircuitState, _to: CircuitState) {}

    fn on_success(&self, _name: &str, _elapsed: Duration) {}

    fn on_failure(&self, _name: &str, _kind: FailureKind, _elapsed: Duration) {}

    fn on_rejected(&self, _name: &str) {}
}

/// 单个熔断器的调用统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallStats {
    pub calls_total: u64,
    pub calls_success: u64,
    pub calls_failed: u64,
    pub calls_timed_out: u64,
    pub calls_rejected: u64,
    pub state_changes: u64,
    pub call_duration_ms: Vec<u64>,
}

/// 按熔断器名汇总调用统计的观察者
#[derive(Clone, Default)]
pub struct CallMetrics {
    stats: Arc<Mutex<HashMap<String, CallStats>>>,
}

impl CallMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<CallStats> {
        self.stats.lock().get(name).cloned()
    }

    pub fn all(&self) -> HashMap<String, CallStats> {
        self.stats.lock().clone()
    }

    fn record<F: FnOnce(&mut CallStats)>(&self, name: &str, f: F) {
        let mut stats = self.stats.lock();
        f(stats.entry(name.to_string()).or_default());
    }

    fn push_duration(stats: &mut CallStats, elapsed: Duration) {
        stats.call_duration_ms.push(elapsed.as_millis() as u64);

        // 只保留最近 1000 次调用的耗时
        if stats.call_duration_ms.len() > 1000 {
            stats.call_duration_ms.remove(0);
        }
    }
}

impl BreakerObserver for CallMetrics {
    fn on_state_change(&self, name: &str, _from: CircuitState, _to: CircuitState) {
        self.record(name, |s| s.state_changes += 1);
    }

    fn on_success(&self, name: &str, elapsed: Duration) {
        self.record(name, |s| {
            s.calls_total += 1;
            s.calls_success += 1;
            Self::push_duration(s, elapsed);
        });
    }

    fn on_failure(&self, name: &str, kind: FailureKind, elapsed: Duration) {
        self.record(name, |s| {
            s.calls_total += 1;
            s.calls_failed += 1;
            if kind == FailureKind::Timeout {
                s.calls_timed_out += 1;
            }
            Self::push_duration(s, elapsed);
        });
    }

    fn on_rejected(&self, name: &str) {
        self.record(name, |s| s.calls_rejected += 1);
    }
}
