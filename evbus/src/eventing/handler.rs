//! 事件处理器（EventHandler）
//!
//! 处理器按事件类型订阅，每次投递尝试都会在新的作用域中由工厂重新构造，
//! 因此不能依赖跨尝试的内存状态。
//!
use super::identity::HandlerKey;
use crate::event::IntegrationEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::marker::PhantomData;
use tokio_util::sync::CancellationToken;

/// 单次投递尝试的上下文
#[derive(Clone, Debug)]
pub struct HandlerContext {
    handler_key: HandlerKey,
    attempt: u32,
    published_at: DateTime<Utc>,
    cancellation: CancellationToken,
}

impl HandlerContext {
    pub fn new(
        handler_key: HandlerKey,
        attempt: u32,
        published_at: DateTime<Utc>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            handler_key,
            attempt,
            published_at,
            cancellation,
        }
    }

    pub fn handler_key(&self) -> &HandlerKey {
        &self.handler_key
    }

    /// 当前尝试序号（0 为首次投递）
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    /// 进程关闭信号；长耗时处理器可自行观察
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

/// 事件处理器：处理 `E` 类型的事件
#[async_trait]
pub trait EventHandler<E: IntegrationEvent>: Send + Sync + 'static {
    async fn handle(&self, ctx: &HandlerContext, event: &E) -> anyhow::Result<()>;
}

/// 类型擦除后的调用失败原因
#[derive(Debug)]
pub(crate) enum InvokeError {
    /// 负载无法还原为事件类型，重试无意义
    Decode(serde_json::Error),
    /// 处理器返回错误
    Handler(anyhow::Error),
}

/// 以 JSON 负载驱动的处理器，供协调器按身份键调用
#[async_trait]
pub(crate) trait ErasedHandler: Send + Sync {
    async fn invoke(&self, ctx: &HandlerContext, payload: &Value) -> Result<(), InvokeError>;
}

pub(crate) struct TypedHandler<E, H> {
    inner: H,
    _event: PhantomData<fn() -> E>,
}

impl<E, H> TypedHandler<E, H> {
    pub(crate) fn new(inner: H) -> Self {
        Self {
            inner,
            _event: PhantomData,
        }
    }
}

#[async_trait]
impl<E, H> ErasedHandler for TypedHandler<E, H>
where
    E: IntegrationEvent,
    H: EventHandler<E>,
{
    async fn invoke(&self, ctx: &HandlerContext, payload: &Value) -> Result<(), InvokeError> {
        let event =
            <E as serde::Deserialize>::deserialize(payload).map_err(InvokeError::Decode)?;
        self.inner
            .handle(ctx, &event)
            .await
            .map_err(InvokeError::Handler)
    }
}
