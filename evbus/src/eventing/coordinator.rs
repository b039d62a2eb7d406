//! 分发协调器（DispatchCoordinator）
//!
//! 状态机：`Scheduled → Running → {Succeeded | Retrying | Exhausted | Dropped | Cancelled}`
//!
//! - `dispatch`：发布时枚举一次处理器集合，为每个处理器调度首次尝试；
//!   此后的重试只针对失败的那一个处理器，发布后新增的处理器不会补投；
//! - `execute`：在新的作用域中按身份键找回处理器并调用，按结果决定重试、耗尽或丢弃。
//!
//! 任何失败都不会回传给发布方，只体现在日志与尝试结果中。
//!
use super::attempt::{AttemptOutcome, DeliveryAttempt, DropReason};
use super::executor::{AttemptRunner, DeferredExecutor};
use super::handler::{HandlerContext, InvokeError};
use super::registry::HandlerCatalog;
use super::retry::RetryPolicy;
use crate::error::DispatchResult;
use crate::event::EventEnvelope;
use async_trait::async_trait;
use bon::Builder;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

#[derive(Builder)]
pub struct DispatchCoordinator {
    catalog: Arc<HandlerCatalog>,
    executor: Arc<dyn DeferredExecutor>,
    /// 全局重试策略；处理器注册时可单独覆盖
    #[builder(default)]
    retry: RetryPolicy,
    /// 单次尝试的超时，超时按处理器失败计
    attempt_timeout: Option<Duration>,
    #[builder(default)]
    cancellation: CancellationToken,
}

impl DispatchCoordinator {
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// 为事件的每个处理器调度首次尝试，返回成功调度的数量
    ///
    /// 没有处理器时仅记录告警并返回 0；全部调度失败时返回最后一个错误。
    #[instrument(
        name = "dispatch",
        skip_all,
        fields(event_kind = %envelope.kind(), event_id = %envelope.event_id())
    )]
    pub async fn dispatch(&self, envelope: &EventEnvelope) -> DispatchResult<usize> {
        let handlers = self.catalog.scope().handlers_for(envelope.kind());
        if handlers.is_empty() {
            warn!("no handlers registered for event kind");
            return Ok(0);
        }

        let now = Utc::now();
        let mut scheduled = 0usize;
        let mut last_err = None;

        for handler in &handlers {
            let attempt = DeliveryAttempt::first(envelope, handler.key().clone());
            match self.executor.schedule(attempt, now).await {
                Ok(handle) => {
                    scheduled += 1;
                    debug!(
                        handler_key = %handler.key(),
                        handler = handler.name(),
                        attempt_id = %handle.id(),
                        "attempt scheduled"
                    );
                }
                Err(err) => {
                    error!(
                        handler_key = %handler.key(),
                        handler = handler.name(),
                        error = %err,
                        "failed to schedule attempt"
                    );
                    last_err = Some(err);
                }
            }
        }

        match last_err {
            Some(err) if scheduled == 0 => Err(err),
            _ => Ok(scheduled),
        }
    }

    /// 执行一次投递尝试
    #[instrument(
        name = "execute",
        skip_all,
        fields(
            event_kind = %attempt.event_kind(),
            event_id = %attempt.event_id(),
            handler_key = %attempt.handler_key(),
            attempt = attempt.attempt(),
            published_at = %attempt.published_at(),
        )
    )]
    pub async fn execute(&self, attempt: DeliveryAttempt) -> AttemptOutcome {
        if self.cancellation.is_cancelled() {
            info!("attempt cancelled before start");
            return AttemptOutcome::Cancelled;
        }

        let registry = self.catalog.scope();
        let Some(handler) = registry.handler_matching(attempt.event_kind(), attempt.handler_key())
        else {
            warn!("no handler matches key; attempt dropped");
            return AttemptOutcome::Dropped(DropReason::HandlerNotFound);
        };

        let ctx = HandlerContext::new(
            attempt.handler_key().clone(),
            attempt.attempt(),
            attempt.published_at(),
            self.cancellation.child_token(),
        );

        let invocation = async {
            let call = handler.invoke(&ctx, attempt.payload());
            match self.attempt_timeout {
                Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
                    Err(InvokeError::Handler(anyhow::anyhow!(
                        "attempt timed out after {}ms",
                        limit.as_millis()
                    )))
                }),
                None => call.await,
            }
        };

        let result = tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => {
                info!("attempt cancelled while running");
                return AttemptOutcome::Cancelled;
            }
            result = invocation => result,
        };

        let latency_ms = attempt.latency_ms(Utc::now());
        match result {
            Ok(()) => {
                info!(handler = handler.name(), latency_ms, "handler succeeded");
                AttemptOutcome::Succeeded
            }
            Err(InvokeError::Decode(err)) => {
                error!(
                    handler = handler.name(),
                    latency_ms,
                    error = %err,
                    "payload cannot be decoded; attempt dropped"
                );
                AttemptOutcome::Dropped(DropReason::MalformedPayload)
            }
            Err(InvokeError::Handler(err)) => {
                let policy = handler.retry_override().unwrap_or(&self.retry);
                self.after_failure(&attempt, policy, handler.name(), latency_ms, err)
                    .await
            }
        }
    }

    async fn after_failure(
        &self,
        attempt: &DeliveryAttempt,
        policy: &RetryPolicy,
        handler: &'static str,
        latency_ms: i64,
        err: anyhow::Error,
    ) -> AttemptOutcome {
        let current = attempt.attempt();
        if !policy.should_retry(current) {
            let attempts = current.saturating_add(1);
            error!(
                handler,
                attempts,
                latency_ms,
                error = %format!("{err:#}"),
                "handler failed; retries exhausted"
            );
            return AttemptOutcome::Exhausted { attempts };
        }

        let delay = policy.next_delay(current);
        let run_not_before = not_before(Utc::now(), delay);
        let successor = attempt.successor();
        let next_attempt = successor.attempt();

        match self.executor.schedule(successor, run_not_before).await {
            Ok(handle) => {
                warn!(
                    handler,
                    next_attempt,
                    delay_ms = delay.as_millis() as u64,
                    latency_ms,
                    error = %format!("{err:#}"),
                    "handler failed; retry scheduled"
                );
                AttemptOutcome::Retrying {
                    next_attempt,
                    delay,
                    handle,
                }
            }
            Err(schedule_err) => {
                error!(
                    handler,
                    next_attempt,
                    error = %format!("{err:#}"),
                    schedule_error = %schedule_err,
                    "handler failed; retry could not be scheduled"
                );
                AttemptOutcome::Dropped(DropReason::RescheduleFailed)
            }
        }
    }
}

#[async_trait]
impl AttemptRunner for DispatchCoordinator {
    async fn execute(&self, attempt: DeliveryAttempt) -> AttemptOutcome {
        DispatchCoordinator::execute(self, attempt).await
    }
}

fn not_before(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(delay)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_before_adds_delay() {
        let now = Utc::now();
        let at = not_before(now, Duration::from_millis(1500));
        assert_eq!((at - now).num_milliseconds(), 1500);
    }

    #[test]
    fn not_before_saturates_on_overflow() {
        let at = not_before(Utc::now(), Duration::MAX);
        assert_eq!(at, DateTime::<Utc>::MAX_UTC);
    }
}
