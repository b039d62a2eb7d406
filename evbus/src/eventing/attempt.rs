//! 投递尝试（DeliveryAttempt）与尝试结果
//!
//! 一次投递尝试只指向一个处理器；扇出即为 N 个互相独立的尝试。
//! 尝试可被序列化，交由任意延迟执行后端在稍后（甚至重启后）再次执行。
//!
use super::identity::HandlerKey;
use crate::event::EventEnvelope;
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    event_id: Uuid,
    #[builder(into)]
    event_kind: String,
    payload: Value,
    handler_key: HandlerKey,
    /// 尝试序号，从 0 开始，每次重试加 1
    #[builder(default)]
    attempt: u32,
    published_at: DateTime<Utc>,
}

impl DeliveryAttempt {
    /// 发布时为某个处理器创建的首次尝试
    pub fn first(envelope: &EventEnvelope, handler_key: HandlerKey) -> Self {
        Self {
            event_id: envelope.event_id(),
            event_kind: envelope.kind().to_string(),
            payload: envelope.payload().clone(),
            handler_key,
            attempt: 0,
            published_at: envelope.published_at(),
        }
    }

    /// 同一 (事件, 处理器) 的下一次尝试
    pub fn successor(&self) -> Self {
        Self {
            attempt: self.attempt.saturating_add(1),
            ..self.clone()
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn event_kind(&self) -> &str {
        &self.event_kind
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn handler_key(&self) -> &HandlerKey {
        &self.handler_key
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    /// 自发布到 `now` 经过的毫秒数
    pub fn latency_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.published_at).num_milliseconds()
    }
}

/// 执行后端为一次调度返回的句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptHandle {
    id: Uuid,
    run_not_before: DateTime<Utc>,
}

impl AttemptHandle {
    pub fn new(run_not_before: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_not_before,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn run_not_before(&self) -> DateTime<Utc> {
        self.run_not_before
    }
}

/// 尝试被丢弃的原因（均不重试）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// 执行时找不到对应身份键的处理器（配置漂移）
    HandlerNotFound,
    /// 负载无法还原为事件
    MalformedPayload,
    /// 执行后端拒绝了后续尝试
    RescheduleFailed,
}

/// 单次尝试的终态
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Succeeded,
    /// 本次失败，已为同一处理器调度了下一次尝试
    Retrying {
        next_attempt: u32,
        delay: Duration,
        handle: AttemptHandle,
    },
    /// 重试预算耗尽
    Exhausted { attempts: u32 },
    Dropped(DropReason),
    Cancelled,
}

impl AttemptOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Retrying { .. } => "failed_retrying",
            Self::Exhausted { .. } => "failed_exhausted",
            Self::Dropped(_) => "failed_dropped",
            Self::Cancelled => "cancelled",
        }
    }

    /// 是否已为该 (事件, 处理器) 安排了后续尝试
    pub fn has_successor(&self) -> bool {
        matches!(self, Self::Retrying { .. })
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> HandlerKey {
        HandlerKey::from_type_name("demo::SendEmail")
    }

    #[test]
    fn first_attempt_copies_envelope() {
        let envelope = EventEnvelope::builder()
            .kind("OrderCreated")
            .payload(serde_json::json!({ "id": "o-1" }))
            .build();
        let attempt = DeliveryAttempt::first(&envelope, key());

        assert_eq!(attempt.attempt(), 0);
        assert_eq!(attempt.event_id(), envelope.event_id());
        assert_eq!(attempt.event_kind(), "OrderCreated");
        assert_eq!(attempt.published_at(), envelope.published_at());
    }

    #[test]
    fn successor_only_bumps_attempt() {
        let attempt = DeliveryAttempt::builder()
            .event_id(Uuid::new_v4())
            .event_kind("OrderCreated")
            .payload(serde_json::json!({}))
            .handler_key(key())
            .published_at(Utc::now())
            .build();

        let next = attempt.successor().successor();
        assert_eq!(next.attempt(), 2);
        assert_eq!(next.handler_key(), attempt.handler_key());
        assert_eq!(next.event_id(), attempt.event_id());
        assert_eq!(next.payload(), attempt.payload());
    }

    #[test]
    fn attempt_survives_serialization_boundary() {
        let attempt = DeliveryAttempt::builder()
            .event_id(Uuid::new_v4())
            .event_kind("OrderCreated")
            .payload(serde_json::json!({ "id": "o-9", "total": 10 }))
            .handler_key(key())
            .attempt(2)
            .published_at(Utc::now())
            .build();

        let wire = serde_json::to_string(&attempt).unwrap();
        let back: DeliveryAttempt = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, attempt);
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(AttemptOutcome::Succeeded.to_string(), "succeeded");
        assert_eq!(
            AttemptOutcome::Dropped(DropReason::HandlerNotFound).label(),
            "failed_dropped"
        );
        assert!(!AttemptOutcome::Cancelled.has_successor());
    }
}
