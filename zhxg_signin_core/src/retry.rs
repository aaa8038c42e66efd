//! 有界重试策略

use crate::error::Error;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// 重试间隔策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// 固定间隔
    Fixed,
    /// interval * 2^(attempt - 1)
    Exponential,
}

/// 单次尝试的结果
#[derive(Debug)]
pub enum Attempt<T> {
    Done(T),
    /// 可重试失败
    Retry(Error),
    /// 立即终止，不再重试
    Abort(Error),
}

/// 重试结束时的失败原因
#[derive(Debug)]
pub enum RetryFailure {
    Aborted(Error),
    Exhausted { attempts: u32, last: Error },
}

/// 成功结果及过程统计
#[derive(Debug)]
pub struct Retried<T> {
    pub value: T,
    /// 实际执行的尝试次数
    pub attempts: u32,
    /// 中间失败的描述（已按 warn 记录）
    pub failures: Vec<String>,
}

/// 重试策略配置
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 为 0 时按 1 次执行
    pub max_attempts: u32,
    pub interval: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// 固定间隔策略，至少 1 次尝试
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
            backoff: Backoff::Fixed,
        }
    }

    /// 不重试
    pub fn none() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// 第 `attempt` 次失败后的等待时间
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.interval.saturating_mul(factor)
            }
        }
    }

    /// 执行 `op` 直到成功、终止或用尽尝试次数
    ///
    /// `op` 接收从 1 开始的尝试序号。最后一次失败后不再等待。
    pub async fn run<T, F, Fut>(&self, mut op: F) -> std::result::Result<Retried<T>, RetryFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt<T>>,
    {
        // 直接构造的策略可能为 0 次，至少执行一次
        let max_attempts = self.max_attempts.max(1);
        let mut failures = Vec::new();
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Attempt::Done(value) => {
                    return Ok(Retried {
                        value,
                        attempts: attempt,
                        failures,
                    })
                }
                Attempt::Abort(e) => return Err(RetryFailure::Aborted(e)),
                Attempt::Retry(e) => {
                    warn!(attempt, max_attempts, "{}", e);
                    if attempt >= max_attempts {
                        return Err(RetryFailure::Exhausted {
                            attempts: attempt,
                            last: e,
                        });
                    }
                    failures.push(e.to_string());
                    tokio::time::sleep(self.delay_for_attempt(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}
