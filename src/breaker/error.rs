//! 熔断器错误类型

use std::time::Duration;

use thiserror::Error;

/// 熔断器返回的错误
///
/// 区分三种情况：熔断器主动拒绝、调用超时、被包装调用本身失败（原始错误原样保留）。
#[derive(Error, Debug)]
pub enum BreakerError<E> {
    #[error("circuit '{name}' is open")]
    Open { name: String },

    #[error("circuit '{name}' timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error("{0}")]
    Call(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BreakerError::Timeout { .. })
    }

    /// 被包装调用的原始错误
    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Call(e) => Some(e),
            _ => None,
        }
    }

    pub fn inner(&self) -> Option<&E> {
        match self {
            BreakerError::Call(e) => Some(e),
            _ => None,
        }
    }
}
