//! 事件引擎（EventEngine）
//!
//! 统一装配「发布 → 扇出调度 → 延迟执行」的长驻任务：
//! - 接收循环：从 `ChannelEventBus` 取出信封，交给协调器扇出；
//! - 执行循环：内存执行器按 not-before 时间回调协调器执行尝试；
//! - 提供关闭与等待的 `EngineHandle`。
//!
use super::bus_inmemory::{ChannelEventBus, ChannelIntake};
use super::coordinator::DispatchCoordinator;
use super::executor_inmemory::{InMemoryExecutor, InMemoryExecutorWorker};
use super::registry::HandlerCatalog;
use crate::config::DispatchConfig;
use bon::Builder;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// EventEngine：
/// - 以进程级处理器登记表与配置构建协调器
/// - 启动接收循环与内存执行器
#[derive(Builder)]
pub struct EventEngine {
    catalog: Arc<HandlerCatalog>,
    #[builder(default)]
    config: DispatchConfig,
}

impl EventEngine {
    /// 启动事件引擎，返回可用于发布/关闭/等待的句柄
    pub fn start(self) -> EngineHandle {
        let token = CancellationToken::new();
        let (executor, worker) = InMemoryExecutor::new(self.config.max_concurrency);

        let coordinator = Arc::new(
            DispatchCoordinator::builder()
                .catalog(self.catalog)
                .executor(Arc::new(executor))
                .retry(self.config.retry)
                .maybe_attempt_timeout(self.config.attempt_timeout)
                .cancellation(token.clone())
                .build(),
        );

        let (bus, intake) = ChannelEventBus::new();
        let tasks = vec![
            Self::spawn_worker(worker, coordinator.clone(), token.clone()),
            Self::spawn_intake(intake, coordinator.clone(), token.clone()),
        ];

        info!(
            max_concurrency = self.config.max_concurrency,
            max_retries = coordinator.retry_policy().max_retries,
            "event engine started"
        );

        EngineHandle {
            token,
            tasks,
            bus,
            coordinator,
        }
    }

    fn spawn_worker(
        worker: InMemoryExecutorWorker,
        coordinator: Arc<DispatchCoordinator>,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(worker.run(coordinator, token))
    }

    fn spawn_intake(
        intake: ChannelIntake,
        coordinator: Arc<DispatchCoordinator>,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(intake.run(coordinator, token))
    }
}

/// 引擎运行句柄：用于发布事件、优雅关闭与等待任务结束
pub struct EngineHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    bus: ChannelEventBus,
    coordinator: Arc<DispatchCoordinator>,
}

impl EngineHandle {
    /// 发布端，可克隆后交给任意生产者
    pub fn bus(&self) -> &ChannelEventBus {
        &self.bus
    }

    pub fn coordinator(&self) -> &Arc<DispatchCoordinator> {
        &self.coordinator
    }

    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn join(mut self) {
        let tasks = std::mem::take(&mut self.tasks);

        for t in tasks {
            let _ = t.await;
        }
        info!("event engine stopped");
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
