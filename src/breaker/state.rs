//! 熔断器状态、事件和指标快照

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 熔断器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// 正常放行，统计失败次数
    Closed,
    /// 直接拒绝调用
    Open,
    /// 放行探测调用，检验依赖是否恢复
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 状态变更事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerEvent {
    pub name: String,
    pub from: CircuitState,
    pub state: CircuitState,
}

impl BreakerEvent {
    /// 事件名：`open` / `half-open` / `closed`
    pub fn kind(&self) -> &'static str {
        match self.state {
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
            CircuitState::Closed => "closed",
        }
    }
}

/// 指标快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerMetrics {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
}
