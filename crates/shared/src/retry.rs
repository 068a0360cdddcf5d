//! 促销引擎调用的重试策略
//!
//! 指数退避，只对调用方判定为瞬时的错误（传输失败、超时）重试。
//! 鉴权失败和请求被拒直接返回。

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::EngineConfig;

/// 重试策略
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 首次调用之外的最大重试次数
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    /// 与 `EngineConfig::default()` 一致：重试 2 次，200ms 起步，上限 2s
    fn default() -> Self {
        Self::from_millis(2, 200, 2_000)
    }
}

impl From<&EngineConfig> for RetryPolicy {
    fn from(config: &EngineConfig) -> Self {
        Self::from_millis(
            config.max_retries,
            config.initial_retry_delay_ms,
            config.max_retry_delay_ms,
        )
    }
}

impl RetryPolicy {
    /// 倍数固定为 2.0
    pub fn from_millis(max_retries: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(initial_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
            multiplier: 2.0,
        }
    }

    /// 只调用一次
    pub fn no_retry() -> Self {
        Self::from_millis(0, 0, 0)
    }

    /// 第 `retry` 次重试前的等待：initial * multiplier^retry，不超过 max_delay
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// 已失败 `failures` 次后是否还能再试
    pub fn should_retry(&self, failures: u32) -> bool {
        failures < self.max_retries
    }
}

/// 按策略执行异步调用
///
/// `is_retryable` 为 false 的错误立即返回；重试用尽后返回最后一次的错误。
pub async fn retry_with_policy<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut failures: u32 = 0;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if failures > 0 {
                    debug!(operation = operation_name, failures, "重试后调用成功");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_retryable(&err) {
            warn!(operation = operation_name, error = %err, "调用失败，错误不可重试");
            return Err(err);
        }
        if !policy.should_retry(failures) {
            warn!(
                operation = operation_name,
                failures = failures + 1,
                error = %err,
                "调用失败，重试次数已用尽"
            );
            return Err(err);
        }

        let delay = policy.delay_for_attempt(failures);
        warn!(
            operation = operation_name,
            retry = failures + 1,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "调用失败，退避后重试"
        );
        tokio::time::sleep(delay).await;
        failures += 1;
    }
}
