//! 进程内事件广播

use async_broadcast::{InactiveReceiver, Receiver, Sender, TrySendError};

/// 事件总线
///
/// 开启溢出模式：订阅者消费过慢时丢弃最旧的事件，发布方永不阻塞。
/// 持有一个非活动接收端，保证没有订阅者时通道也不会关闭。
pub(crate) struct EventBus<T: Clone> {
    tx: Sender<T>,
    keepalive: InactiveReceiver<T>,
}

impl<T: Clone> EventBus<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        let (mut tx, rx) = async_broadcast::broadcast(capacity.max(1));
        tx.set_overflow(true);
        Self {
            tx,
            keepalive: rx.deactivate(),
        }
    }

    pub(crate) fn subscribe(&self) -> Receiver<T> {
        self.keepalive.activate_cloned()
    }

    pub(crate) fn publish(&self, event: T) {
        match self.tx.try_broadcast(event) {
            Ok(_) | Err(TrySendError::Inactive(_)) => {}
            Err(e) => tracing::debug!(error = %e, "event dropped"),
        }
    }
}
