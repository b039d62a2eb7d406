//! 事件子系统（eventing）
//!
//! 提供进程内事件分发的协议与运行时：
//! - `EventBus`：发布即返回的总线接口，以及通道式/直接调度式两种实现；
//! - `HandlerCatalog`/`HandlerRegistry`：启动期注册、按执行作用域解析的处理器表；
//! - `key_of`：由处理器类型推导稳定身份键；
//! - `RetryPolicy`：有界指数退避与抖动；
//! - `DispatchCoordinator`：扇出调度与单次尝试的状态机；
//! - `DeferredExecutor`：延迟执行端口及其内存实现；
//! - `EventEngine`：装配上述组件的长驻任务。
//!
pub mod attempt;
pub mod bus;
pub mod bus_inmemory;
pub mod coordinator;
pub mod engine;
pub mod executor;
pub mod executor_inmemory;
pub mod handler;
pub mod identity;
pub mod registry;
pub mod retry;

pub use attempt::{AttemptHandle, AttemptOutcome, DeliveryAttempt, DropReason};
pub use bus::{EventBus, PublishReceipt};
pub use bus_inmemory::{ChannelEventBus, ChannelIntake, DirectEventBus};
pub use coordinator::DispatchCoordinator;
pub use engine::{EngineHandle, EventEngine};
pub use executor::{AttemptRunner, DeferredExecutor};
pub use executor_inmemory::{InMemoryExecutor, InMemoryExecutorWorker};
pub use handler::{EventHandler, HandlerContext};
pub use identity::{HandlerKey, key_of};
pub use registry::{HandlerCatalog, HandlerRegistry, ResolvedHandler};
pub use retry::{Backoff, MAX_RETRY_DELAY, RetryPolicy};
