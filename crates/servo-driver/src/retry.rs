//! 事务重试策略
//!
//! 默认只尝试一次。开启后仅对事务级通信错误重试，退避时间按尝试次数线性增长。

use crate::DriverError;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 总尝试次数（含第一次），最小为 1
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::from_millis(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn run<T>(&self, mut op: impl FnMut() -> Result<T, DriverError>) -> Result<T, DriverError> {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!("Transaction failed (attempt {}/{}): {}", attempt, attempts, e);
                    spin_sleep::sleep(self.backoff * attempt);
                    attempt += 1;
                },
                other => return other,
            }
        }
    }
}
