//! 进程内事件分发库（evbus）
//!
//! 生产者只发布一次类型化事件，引擎按事件类型扇出到每个已注册处理器：
//! - 每个处理器对应一个独立的投递尝试，失败互不影响，也不回传给发布方；
//! - 处理器以类型推导出的稳定身份键寻址，延迟重投时据此找回同一个逻辑处理器；
//! - 失败的尝试按有界指数退避加抖动重试，退避通过延迟执行端口调度，不占用执行任务。
//!
//! 典型用法：
//! 1. 用 `#[integration_event]` 定义事件，实现 `EventHandler<E>`；
//! 2. 在启动期向 `HandlerCatalog` 注册处理器工厂；
//! 3. 以 catalog 与 `DispatchConfig` 构建 `EventEngine` 并 `start`；
//! 4. 通过 `EngineHandle::bus()` 发布事件，结束时 `shutdown` + `join`。
//!
pub mod config;
pub mod error;
pub mod event;
pub mod eventing;

// 允许在本 crate 内部通过 ::evbus 进行自引用，
// 以便过程宏在本 crate 的单元测试中也能解析到 ::evbus 路径。
extern crate self as evbus;
