//! 延迟执行端口（DeferredExecutor）
//!
//! 核心唯一必需的外部协作方：接受「在某时刻之后执行这个 (事件, 处理器) 尝试」的请求，
//! 并在到期后回调 `AttemptRunner::execute`。具体后端可以是内存队列、持久化作业表或定时调度器。
//!
//! 正常情况下每个调度单元恰好执行一次；后端提供至少一次语义亦可接受（前提是处理器幂等）。
//!
use super::attempt::{AttemptHandle, AttemptOutcome, DeliveryAttempt};
use crate::error::DispatchResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait DeferredExecutor: Send + Sync {
    /// 调度一次投递尝试，不早于 `run_not_before` 执行
    async fn schedule(
        &self,
        attempt: DeliveryAttempt,
        run_not_before: DateTime<Utc>,
    ) -> DispatchResult<AttemptHandle>;
}

/// 尝试执行入口：后端到期后回调，可在任意任务/线程上调用
#[async_trait]
pub trait AttemptRunner: Send + Sync {
    async fn execute(&self, attempt: DeliveryAttempt) -> AttemptOutcome;
}
