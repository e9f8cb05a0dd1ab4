//! 熔断器
//!
//! 包装对不可靠依赖的异步调用：连续失败达到阈值后打开熔断器并快速失败，
//! 经过 `reset_timeout` 后进入半开状态放行探测调用，探测成功足够次数后关闭。
//!
//! 状态转换：
//!
//! ```text
//! CLOSED --(连续失败 >= failure_threshold)--> OPEN
//! OPEN --(reset_timeout 到期)--> HALF_OPEN
//! HALF_OPEN --(成功 >= half_open_success_threshold)--> CLOSED
//! HALF_OPEN --(任意失败)--> OPEN
//! ```
//!
//! 每次状态转换都会递增代数（generation），调用开始时记录代数，结束时若代数已变
//! 则丢弃该结果，避免旧状态下发起的慢调用影响新状态。

pub mod config;
pub mod error;
pub mod observer;
pub mod registry;
pub mod state;

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::events::EventBus;

pub use config::{BreakerOptions, CircuitBreakerConfig};
pub use error::BreakerError;
pub use observer::{BreakerObserver, CallMetrics, CallStats, FailureKind};
pub use registry::CircuitBreakerRegistry;
pub use state::{BreakerEvent, BreakerMetrics, CircuitState};

const EVENT_CAPACITY: usize = 64;

/// 熔断器
///
/// 克隆得到的是同一个熔断器的另一个句柄。
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<BreakerInner>,
}

struct BreakerInner {
    name: String,
    config: CircuitBreakerConfig,
    core: Mutex<BreakerCore>,
    observers: Vec<Arc<dyn BreakerObserver>>,
    events: EventBus<BreakerEvent>,
}

struct BreakerCore {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<DateTime<Utc>>,
    /// OPEN 状态下允许探测的时间点，`None` 表示被强制打开
    reopen_at: Option<Instant>,
    in_flight_probes: usize,
    generation: u64,
    reset_timer: Option<JoinHandle<()>>,
}

impl BreakerCore {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
            reopen_at: None,
            in_flight_probes: 0,
            generation: 0,
            reset_timer: None,
        }
    }

    /// 切换状态并开始新的一代，返回实际发生的转换
    fn set_state(&mut self, to: CircuitState) -> Option<Transition> {
        let from = self.state;
        self.state = to;
        self.generation += 1;
        self.in_flight_probes = 0;
        self.reopen_at = None;
        if let Some(timer) = self.reset_timer.take() {
            timer.abort();
        }
        (from != to).then_some(Transition { from, to })
    }
}

impl Drop for BreakerCore {
    fn drop(&mut self) {
        if let Some(timer) = self.reset_timer.take() {
            timer.abort();
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    from: CircuitState,
    to: CircuitState,
}

/// 一次被放行的调用
///
/// 探测调用在 drop 时归还半开名额，调用被取消时同样生效。
struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    probe: bool,
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.probe {
            return;
        }
        let mut core = self.breaker.inner.core.lock();
        if core.generation == self.generation && core.in_flight_probes > 0 {
            core.in_flight_probes -= 1;
        }
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_observers(name, config, Vec::new())
    }

    pub fn with_observers(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        observers: Vec<Arc<dyn BreakerObserver>>,
    ) -> Self {
        Self {
            inner: Arc::new(BreakerInner {
                name: name.into(),
                config,
                core: Mutex::new(BreakerCore::new()),
                observers,
                events: EventBus::new(EVENT_CAPACITY),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.inner.config
    }

    /// 两个句柄是否指向同一个熔断器
    pub fn ptr_eq(&self, other: &CircuitBreaker) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// 当前状态
    ///
    /// 打开期限已过但计时器尚未触发时，这里仍然返回 `Open`；下一次调用会转入半开。
    pub fn state(&self) -> CircuitState {
        self.inner.core.lock().state
    }

    pub fn metrics(&self) -> BreakerMetrics {
        let core = self.inner.core.lock();
        BreakerMetrics {
            name: self.inner.name.clone(),
            state: core.state,
            failure_count: core.failure_count,
            success_count: core.success_count,
            last_failure_time: core.last_failure_time,
        }
    }

    /// 订阅状态变更事件
    pub fn subscribe(&self) -> async_broadcast::Receiver<BreakerEvent> {
        self.inner.events.subscribe()
    }

    /// 通过熔断器执行一次调用
    ///
    /// 熔断器拒绝时 `op` 不会被调用。
    pub async fn execute<F, Fut, T, E>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(permit) = self.acquire() else {
            for observer in &self.inner.observers {
                observer.on_rejected(&self.inner.name);
            }
            return Err(BreakerError::Open {
                name: self.inner.name.clone(),
            });
        };

        let timeout = self.inner.config.timeout;
        let started = Instant::now();
        let outcome = if timeout.is_zero() {
            Some(op().await)
        } else {
            tokio::time::timeout(timeout, op()).await.ok()
        };
        let elapsed = started.elapsed();

        let result = match outcome {
            Some(Ok(value)) => {
                self.on_success(permit.generation, elapsed);
                Ok(value)
            }
            Some(Err(e)) => {
                self.on_failure(permit.generation, FailureKind::Error, elapsed);
                Err(BreakerError::Call(e))
            }
            None => {
                self.on_failure(permit.generation, FailureKind::Timeout, elapsed);
                Err(BreakerError::Timeout {
                    name: self.inner.name.clone(),
                    timeout,
                })
            }
        };
        drop(permit);
        result
    }

    /// 执行调用，失败（包括被拒绝和超时）时改由 `fallback` 给出结果
    ///
    /// `fallback` 的结果不会计入熔断器统计。
    pub async fn execute_with_fallback<F, Fut, T, E, FB, FbFut>(
        &self,
        op: F,
        fallback: FB,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce(BreakerError<E>) -> FbFut,
        FbFut: Future<Output = Result<T, BreakerError<E>>>,
    {
        match self.execute(op).await {
            Ok(value) => Ok(value),
            Err(e) => {
                debug!(breaker = %self.inner.name, error_kind = error_kind(&e), "using fallback");
                fallback(e).await
            }
        }
    }

    /// 强制打开，直到 `force_closed` / `reset` 之前都不会自动转入半开
    pub fn force_open(&self) {
        let transition = {
            let mut core = self.inner.core.lock();
            core.set_state(CircuitState::Open)
        };
        warn!(breaker = %self.inner.name, "circuit forced open");
        self.notify(transition);
    }

    /// 强制关闭并清空计数
    pub fn force_closed(&self) {
        let transition = {
            let mut core = self.inner.core.lock();
            let transition = core.set_state(CircuitState::Closed);
            core.failure_count = 0;
            core.success_count = 0;
            transition
        };
        info!(breaker = %self.inner.name, "circuit forced closed");
        self.notify(transition);
    }

    /// 恢复初始状态，等同于 [`force_closed`](Self::force_closed)
    pub fn reset(&self) {
        self.force_closed();
    }

    fn acquire(&self) -> Option<CallPermit<'_>> {
        let (permit, transition) = {
            let mut core = self.inner.core.lock();
            match core.state {
                CircuitState::Closed => (Some((core.generation, false)), None),
                CircuitState::Open => match core.reopen_at {
                    Some(at) if Instant::now() >= at => {
                        let transition = self.enter_half_open(&mut core);
                        core.in_flight_probes += 1;
                        (Some((core.generation, true)), transition)
                    }
                    _ => (None, None),
                },
                CircuitState::HalfOpen => {
                    let max = self.inner.config.half_open_max_probes;
                    if max == 0 || core.in_flight_probes < max {
                        core.in_flight_probes += 1;
                        (Some((core.generation, true)), None)
                    } else {
                        (None, None)
                    }
                }
            }
        };
        self.notify(transition);

        permit.map(|(generation, probe)| CallPermit {
            breaker: self,
            generation,
            probe,
        })
    }

    fn on_success(&self, generation: u64, elapsed: Duration) {
        let transition = {
            let mut core = self.inner.core.lock();
            if core.generation == generation {
                self.record_success(&mut core)
            } else {
                debug!(breaker = %self.inner.name, "discarding outcome from previous state");
                None
            }
        };

        // 过期的结果不影响状态，但调用本身仍计入观察者
        for observer in &self.inner.observers {
            observer.on_success(&self.inner.name, elapsed);
        }
        self.notify(transition);
    }

    fn on_failure(&self, generation: u64, kind: FailureKind, elapsed: Duration) {
        let transition = {
            let mut core = self.inner.core.lock();
            if core.generation == generation {
                self.record_failure(&mut core)
            } else {
                debug!(breaker = %self.inner.name, "discarding outcome from previous state");
                None
            }
        };

        for observer in &self.inner.observers {
            observer.on_failure(&self.inner.name, kind, elapsed);
        }
        self.notify(transition);
    }

    fn record_success(&self, core: &mut BreakerCore) -> Option<Transition> {
        match core.state {
            CircuitState::Closed => {
                core.failure_count = 0;
                None
            }
            CircuitState::HalfOpen => {
                core.success_count += 1;
                if core.success_count >= self.inner.config.half_open_success_threshold {
                    let transition = core.set_state(CircuitState::Closed);
                    core.failure_count = 0;
                    core.success_count = 0;
                    transition
                } else {
                    None
                }
            }
            CircuitState::Open => None,
        }
    }

    fn record_failure(&self, core: &mut BreakerCore) -> Option<Transition> {
        match core.state {
            CircuitState::Closed => {
                core.failure_count += 1;
                core.last_failure_time = Some(Utc::now());
                if core.failure_count >= self.inner.config.failure_threshold {
                    self.enter_open(core)
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                core.last_failure_time = Some(Utc::now());
                let transition = self.enter_open(core);
                core.failure_count = 0;
                transition
            }
            CircuitState::Open => None,
        }
    }

    /// 打开熔断器并安排半开计时；失败计数保持不变
    fn enter_open(&self, core: &mut BreakerCore) -> Option<Transition> {
        let transition = core.set_state(CircuitState::Open);
        core.success_count = 0;
        core.reopen_at = Some(Instant::now() + self.inner.config.reset_timeout);
        core.reset_timer = self.schedule_half_open(core.generation);
        transition
    }

    fn enter_half_open(&self, core: &mut BreakerCore) -> Option<Transition> {
        let transition = core.set_state(CircuitState::HalfOpen);
        core.failure_count = 0;
        core.success_count = 0;
        transition
    }

    /// 期限到期时主动转入半开，让订阅者无需发起调用也能收到通知
    ///
    /// 不在 tokio 运行时内时不安排计时器，由下一次调用惰性转换。
    fn schedule_half_open(&self, generation: u64) -> Option<JoinHandle<()>> {
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let weak: Weak<BreakerInner> = Arc::downgrade(&self.inner);
        let delay = self.inner.config.reset_timeout;

        Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                CircuitBreaker { inner }.half_open_from_timer(generation);
            }
        }))
    }

    fn half_open_from_timer(&self, generation: u64) {
        let transition = {
            let mut core = self.inner.core.lock();
            if core.generation != generation || core.state != CircuitState::Open {
                return;
            }
            // 当前任务就是计时器本身，只分离不终止
            drop(core.reset_timer.take());
            self.enter_half_open(&mut core)
        };
        self.notify(transition);
    }

    fn notify(&self, transition: Option<Transition>) {
        let Some(Transition { from, to }) = transition else {
            return;
        };

        match to {
            CircuitState::Open => warn!(
                breaker = %self.inner.name,
                from = %from,
                "⚡ Circuit opened"
            ),
            CircuitState::HalfOpen => info!(
                breaker = %self.inner.name,
                from = %from,
                "Circuit half-open, probing"
            ),
            CircuitState::Closed => info!(
                breaker = %self.inner.name,
                from = %from,
                "✅ Circuit closed"
            ),
        }

        for observer in &self.inner.observers {
            observer.on_state_change(&self.inner.name, from, to);
        }
        self.inner.events.publish(BreakerEvent {
            name: self.inner.name.clone(),
            from,
            state: to,
        });
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish()
    }
}

fn error_kind<E>(error: &BreakerError<E>) -> &'static str {
    match error {
        BreakerError::Open { .. } => "open",
        BreakerError::Timeout { .. } => "timeout",
        BreakerError::Call(_) => "call",
    }
}
