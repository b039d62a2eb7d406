//! 事件总线（EventBus）协议
//!
//! 发布即返回：回执只表示事件已被接收，不代表任何处理器已执行。
//! 处理器失败、重试与耗尽都不会传回发布方。
//!
use crate::error::DispatchResult;
use crate::event::{EventEnvelope, IntegrationEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 发布回执
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub event_id: Uuid,
    pub kind: String,
    pub published_at: DateTime<Utc>,
}

impl From<&EventEnvelope> for PublishReceipt {
    fn from(envelope: &EventEnvelope) -> Self {
        Self {
            event_id: envelope.event_id(),
            kind: envelope.kind().to_string(),
            published_at: envelope.published_at(),
        }
    }
}

/// 事件总线：接收事件并交由协调器扇出
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish_envelope(&self, envelope: EventEnvelope) -> DispatchResult<PublishReceipt>;

    /// 序列化并发布一个具体事件；序列化失败时事件不会进入引擎
    async fn publish<E: IntegrationEvent>(&self, event: &E) -> DispatchResult<PublishReceipt>
    where
        Self: Sized,
    {
        let envelope = EventEnvelope::wrap(event)?;
        self.publish_envelope(envelope).await
    }

    async fn publish_batch(
        &self,
        envelopes: Vec<EventEnvelope>,
    ) -> DispatchResult<Vec<PublishReceipt>> {
        let mut receipts = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            receipts.push(self.publish_envelope(envelope).await?);
        }
        Ok(receipts)
    }
}
