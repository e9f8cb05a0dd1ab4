//! 负载均衡模块
//!
//! 按服务名维护客户端本地的负载均衡状态，从多个健康实例中选择一个。

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::registry::ServiceRecord;

/// 负载均衡策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadBalanceStrategy {
    /// 轮询
    #[default]
    RoundRobin,
    /// 随机
    Random,
    /// 一致性哈希（需要哈希键，缺省时退化为轮询）
    ConsistentHash,
}

impl FromStr for LoadBalanceStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "round-robin" | "roundrobin" => Ok(LoadBalanceStrategy::RoundRobin),
            "random" => Ok(LoadBalanceStrategy::Random),
            "consistent-hash" | "consistenthash" => Ok(LoadBalanceStrategy::ConsistentHash),
            _ => Err(format!("Unknown load balance strategy: {}", s)),
        }
    }
}

/// 单个服务名的负载均衡状态
#[derive(Debug, Default)]
struct BalancerState {
    next: usize,
    candidates: Vec<ServiceRecord>,
}

/// 负载均衡器
///
/// 状态只存在于本进程内存中，首次查询某个服务名时惰性创建。
#[derive(Debug, Default)]
pub struct LoadBalancer {
    states: Mutex<HashMap<String, BalancerState>>,
}

impl LoadBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从候选列表中选择一个实例
    ///
    /// 轮询索引只对*当前*候选数量取模，不与上一次的列表对齐：成员变化时
    /// 可能跳过或重复某个实例。
    pub fn select(
        &self,
        name: &str,
        candidates: Vec<ServiceRecord>,
        strategy: LoadBalanceStrategy,
        key: Option<&str>,
    ) -> Option<ServiceRecord> {
        let mut states = self.states.lock();
        let state = states.entry(name.to_string()).or_default();
        state.candidates = candidates;

        let len = state.candidates.len();
        if len == 0 {
            return None;
        }

        let index = match (strategy, key) {
            (LoadBalanceStrategy::Random, _) => rand::thread_rng().gen_range(0..len),
            (LoadBalanceStrategy::ConsistentHash, Some(key)) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                (hasher.finish() % len as u64) as usize
            }
            (LoadBalanceStrategy::RoundRobin, _) | (LoadBalanceStrategy::ConsistentHash, None) => {
                let index = state.next % len;
                state.next = (index + 1) % len;
                index
            }
        };

        state.candidates.get(index).cloned()
    }

    /// 最近一次为该服务名取得的候选列表
    pub fn last_candidates(&self, name: &str) -> Vec<ServiceRecord> {
        self.states
            .lock()
            .get(name)
            .map(|s| s.candidates.clone())
            .unwrap_or_default()
    }

    /// 丢弃某个服务名的状态
    pub fn reset(&self, name: &str) {
        self.states.lock().remove(name);
    }
}
