//! 内存版延迟执行后端（InMemoryExecutor）
//!
//! - `schedule`：写入无界通道后立即返回；
//! - 单个消费循环把尝试放入 `DelayQueue`，到期后派生独立任务执行，
//!   退避等待期间不占用任何执行任务；
//! - 并发执行数由信号量限制，许可在派生任务内获取，消费循环不会因容量阻塞；
//! - 收到关闭信号后，尚在等待中的尝试直接丢弃（视为取消），并等待执行中的任务结束；
//! - `DelayQueue` 能表达的最长延迟约 2 年，更远的 not-before 时间按上限分段排队，
//!   到期时若仍未到点则重新排队。
//!
//! 典型用途：单进程部署、测试与示例。重启后未执行的尝试会丢失。
//!
use super::attempt::{AttemptHandle, DeliveryAttempt};
use super::executor::{AttemptRunner, DeferredExecutor};
use crate::error::{DispatchError, DispatchResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::time::DelayQueue;
use tracing::{debug, info};

/// 单次排队的最长延迟，低于 `DelayQueue` 的上限
const MAX_QUEUE_DELAY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// 距 `run_not_before` 的剩余时长，截断到 `MAX_QUEUE_DELAY`
fn queue_delay(run_not_before: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (run_not_before - now)
        .to_std()
        .unwrap_or(Duration::ZERO)
        .min(MAX_QUEUE_DELAY)
}

struct ScheduledAttempt {
    handle: AttemptHandle,
    attempt: DeliveryAttempt,
}

/// 调度端，可自由克隆
#[derive(Clone)]
pub struct InMemoryExecutor {
    tx: mpsc::UnboundedSender<ScheduledAttempt>,
}

/// 消费端：由 `run` 驱动
pub struct InMemoryExecutorWorker {
    rx: mpsc::UnboundedReceiver<ScheduledAttempt>,
    max_concurrency: usize,
}

impl InMemoryExecutor {
    pub fn new(max_concurrency: usize) -> (Self, InMemoryExecutorWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self { tx },
            InMemoryExecutorWorker {
                rx,
                max_concurrency: max_concurrency.max(1),
            },
        )
    }
}

#[async_trait]
impl DeferredExecutor for InMemoryExecutor {
    async fn schedule(
        &self,
        attempt: DeliveryAttempt,
        run_not_before: DateTime<Utc>,
    ) -> DispatchResult<AttemptHandle> {
        let handle = AttemptHandle::new(run_not_before);
        self.tx
            .send(ScheduledAttempt { handle, attempt })
            .map_err(|_| DispatchError::executor("in-memory executor is not running"))?;
        Ok(handle)
    }
}

impl InMemoryExecutorWorker {
    /// 消费循环，直到收到关闭信号或调度端全部释放且无待执行尝试
    pub async fn run(self, runner: Arc<dyn AttemptRunner>, token: CancellationToken) {
        let Self {
            mut rx,
            max_concurrency,
        } = self;
        let mut pending: DelayQueue<ScheduledAttempt> = DelayQueue::new();
        let permits = Arc::new(Semaphore::new(max_concurrency));
        let tracker = TaskTracker::new();
        let mut intake_open = true;

        loop {
            if !intake_open && pending.is_empty() {
                break;
            }

            tokio::select! {
                _ = token.cancelled() => break,
                received = rx.recv(), if intake_open => match received {
                    Some(scheduled) => {
                        let delay = queue_delay(scheduled.handle.run_not_before(), Utc::now());
                        debug!(
                            attempt_id = %scheduled.handle.id(),
                            handler_key = %scheduled.attempt.handler_key(),
                            attempt = scheduled.attempt.attempt(),
                            delay_ms = delay.as_millis() as u64,
                            "attempt queued"
                        );
                        pending.insert(scheduled, delay);
                    }
                    None => intake_open = false,
                },
                Some(expired) = pending.next(), if !pending.is_empty() => {
                    let scheduled = expired.into_inner();
                    let now = Utc::now();
                    if scheduled.handle.run_not_before() > now {
                        let delay = queue_delay(scheduled.handle.run_not_before(), now);
                        debug!(
                            attempt_id = %scheduled.handle.id(),
                            delay_ms = delay.as_millis() as u64,
                            "attempt not yet due; re-queued"
                        );
                        pending.insert(scheduled, delay);
                        continue;
                    }

                    let ScheduledAttempt { handle, attempt } = scheduled;
                    let runner = runner.clone();
                    let permits = permits.clone();
                    tracker.spawn(async move {
                        let Ok(_permit) = permits.acquire_owned().await else {
                            return;
                        };
                        let outcome = runner.execute(attempt).await;
                        debug!(attempt_id = %handle.id(), %outcome, "attempt finished");
                    });
                }
            }
        }

        if !pending.is_empty() {
            info!(
                pending = pending.len(),
                "executor stopped; delayed attempts cancelled"
            );
        }
        tracker.close();
        tracker.wait().await;
    }
}
