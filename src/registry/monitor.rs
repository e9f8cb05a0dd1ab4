//! 心跳与健康检查后台任务
//!
//! 两个周期在同一个任务中通过 `select!` 驱动，回调之间不会并发执行。
//! 任务只持有注册中心的弱引用，注册中心释放后任务随之退出。

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{RegistryInner, ServiceRegistry};

/// `interval` 不接受零周期
const MIN_PERIOD: Duration = Duration::from_millis(1);

pub(crate) struct MonitorHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl MonitorHandle {
    pub(crate) fn spawn(inner: &Arc<RegistryInner>) -> Self {
        let token = CancellationToken::new();
        let weak = Arc::downgrade(inner);
        let handle = tokio::spawn(run(
            weak,
            token.clone(),
            inner.config.heartbeat_interval(),
            inner.config.health_check_interval(),
        ));
        Self { token, handle }
    }

    /// 仅发出取消信号，不等待任务结束（用于 Drop）
    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    /// 取消并等待任务退出
    pub(crate) async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                tracing::error!(error = %e, "registry monitor task panicked");
            }
        }
    }
}

async fn run(
    weak: Weak<RegistryInner>,
    token: CancellationToken,
    heartbeat_every: Duration,
    check_every: Duration,
) {
    let heartbeat_every = heartbeat_every.max(MIN_PERIOD);
    let check_every = check_every.max(MIN_PERIOD);
    let mut heartbeat = interval(heartbeat_every);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut health = interval(check_every);
    health.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        heartbeat_ms = heartbeat_every.as_millis() as u64,
        health_check_ms = check_every.as_millis() as u64,
        "registry monitor started"
    );

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = heartbeat.tick() => {
                let Some(inner) = weak.upgrade() else { break };
                ServiceRegistry { inner }.heartbeat_owned().await;
            }
            _ = health.tick() => {
                let Some(inner) = weak.upgrade() else { break };
                ServiceRegistry { inner }.run_health_check().await;
            }
        }
    }

    debug!("registry monitor stopped");
}
