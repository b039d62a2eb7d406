//! 集成事件（IntegrationEvent）与事件信封（EventEnvelope）
//!
//! 事件只承载数据：发布时被序列化为 JSON 负载并装入信封，
//! 以便跨越执行边界（内存队列、持久化作业表等）传递。
//!
use crate::error::{DispatchError, DispatchResult};
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// 可发布事件需要满足的能力边界
///
/// `KIND` 是事件类型的稳定名称，处理器注册与查找均以它为键。
/// 通常由 `#[integration_event]` 宏生成。
pub trait IntegrationEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: &'static str;
}

/// 已发布事件的类型擦除形态
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// 事件实例标识，用于在日志中关联同一事件的全部投递尝试
    #[builder(default = Uuid::new_v4())]
    event_id: Uuid,
    /// 事件类型
    #[builder(into)]
    kind: String,
    /// 事件负载
    payload: Value,
    /// 发布时间，用于计算分发延迟
    #[builder(default = Utc::now())]
    published_at: DateTime<Utc>,
}

impl EventEnvelope {
    /// 序列化事件并装入信封
    pub fn wrap<E: IntegrationEvent>(event: &E) -> DispatchResult<Self> {
        Ok(Self::builder()
            .kind(E::KIND)
            .payload(serde_json::to_value(event)?)
            .build())
    }

    /// 还原为具体事件类型；类型不符时返回 `TypeMismatch`
    pub fn decode<E: IntegrationEvent>(&self) -> DispatchResult<E> {
        if self.kind != E::KIND {
            return Err(DispatchError::TypeMismatch {
                expected: E::KIND.to_string(),
                found: self.kind.clone(),
            });
        }
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct OrderCreated {
        id: String,
        total: u64,
    }

    impl IntegrationEvent for OrderCreated {
        const KIND: &'static str = "OrderCreated";
    }

    #[evbus_macros::integration_event(kind = "orders.shipped")]
    struct OrderShipped {
        id: String,
    }

    #[test]
    fn wrap_records_kind_and_payload() {
        let event = OrderCreated {
            id: "o-1".into(),
            total: 10,
        };
        let envelope = EventEnvelope::wrap(&event).unwrap();

        assert_eq!(envelope.kind(), "OrderCreated");
        assert_eq!(envelope.payload()["total"], 10);
        assert_eq!(envelope.decode::<OrderCreated>().unwrap(), event);
    }

    #[test]
    fn decode_rejects_other_kind() {
        let envelope = EventEnvelope::wrap(&OrderShipped { id: "o-1".into() }).unwrap();
        assert_eq!(envelope.kind(), "orders.shipped");
        let err = envelope.decode::<OrderCreated>().unwrap_err();
        assert!(matches!(err, DispatchError::TypeMismatch { .. }));
    }
}
