//! 事件分发统一错误定义
//!
//! 覆盖序列化、总线/执行器、处理器注册与配置校验等最小必要集合。
//! 处理器自身的业务错误使用 `anyhow::Error`，不在此枚举中。
//!
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DispatchError {
    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch { expected: String, found: String },

    // --- 总线/执行器 ---
    #[error("event bus error: {reason}")]
    EventBus { reason: String },
    #[error("executor error: {reason}")]
    Executor { reason: String },

    // --- 处理器注册 ---
    #[error("handler already registered: kind={kind}, handler={handler}")]
    HandlerAlreadyRegistered { kind: String, handler: String },
    #[error(
        "handler key collision: kind={kind}, key={key}, existing={existing}, incoming={incoming}"
    )]
    HandlerKeyCollision {
        kind: String,
        key: String,
        existing: String,
        incoming: String,
    },
    #[error("invalid handler key: {0}")]
    InvalidHandlerKey(String),

    // --- 配置 ---
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },
    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl DispatchError {
    pub fn event_bus(reason: impl Into<String>) -> Self {
        Self::EventBus {
            reason: reason.into(),
        }
    }

    pub fn executor(reason: impl Into<String>) -> Self {
        Self::Executor {
            reason: reason.into(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// 统一 Result 类型别名
pub type DispatchResult<T> = Result<T, DispatchError>;
