//! 内存版事件总线
//!
//! - `ChannelEventBus`：基于 `tokio::sync::mpsc` 的无界接收通道，发布只做入队；
//!   单个消费循环（`ChannelIntake::run`）把信封交给协调器扇出；
//! - `DirectEventBus`：发布时直接调用协调器完成扇出调度（只调度，不执行处理器）。
//!
//! 两种实现都不会在发布调用路径上执行任何处理器。
//!
use super::bus::{EventBus, PublishReceipt};
use super::coordinator::DispatchCoordinator;
use crate::error::{DispatchError, DispatchResult};
use crate::event::EventEnvelope;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// 通道式事件总线，可自由克隆
#[derive(Clone)]
pub struct ChannelEventBus {
    tx: mpsc::UnboundedSender<EventEnvelope>,
}

/// 通道消费端
pub struct ChannelIntake {
    rx: mpsc::UnboundedReceiver<EventEnvelope>,
}

impl ChannelEventBus {
    pub fn new() -> (Self, ChannelIntake) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, ChannelIntake { rx })
    }
}

#[async_trait]
impl EventBus for ChannelEventBus {
    async fn publish_envelope(&self, envelope: EventEnvelope) -> DispatchResult<PublishReceipt> {
        let receipt = PublishReceipt::from(&envelope);
        self.tx
            .send(envelope)
            .map_err(|_| DispatchError::event_bus("event intake is closed"))?;
        info!(
            event_kind = %receipt.kind,
            event_id = %receipt.event_id,
            published_at = %receipt.published_at,
            "event published"
        );
        Ok(receipt)
    }
}

impl ChannelIntake {
    /// 消费循环：直到收到关闭信号或全部发布端释放
    ///
    /// 收到关闭信号时通道中尚未扇出的事件被丢弃，数量记录在日志中。
    pub async fn run(mut self, coordinator: Arc<DispatchCoordinator>, token: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                maybe_envelope = self.rx.recv() => {
                    let Some(envelope) = maybe_envelope else {
                        break;
                    };
                    if let Err(err) = coordinator.dispatch(&envelope).await {
                        error!(
                            event_kind = %envelope.kind(),
                            event_id = %envelope.event_id(),
                            error = %err,
                            "event could not be dispatched"
                        );
                    }
                }
            }
        }

        let pending = self.rx.len();
        if pending > 0 {
            info!(pending, "event intake stopped; published events dropped");
        }
    }
}

/// 直接调度式事件总线
#[derive(Clone)]
pub struct DirectEventBus {
    coordinator: Arc<DispatchCoordinator>,
}

impl DirectEventBus {
    pub fn new(coordinator: Arc<DispatchCoordinator>) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl EventBus for DirectEventBus {
    async fn publish_envelope(&self, envelope: EventEnvelope) -> DispatchResult<PublishReceipt> {
        let receipt = PublishReceipt::from(&envelope);
        info!(
            event_kind = %receipt.kind,
            event_id = %receipt.event_id,
            published_at = %receipt.published_at,
            "event published"
        );
        self.coordinator.dispatch(&envelope).await?;
        Ok(receipt)
    }
}
