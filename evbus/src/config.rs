//! 分发配置（DispatchConfig）
//!
//! 进程级配置：默认重试策略、单次尝试超时与内存执行器的并发上限。
//! 时长统一以毫秒整数书写（`*_ms` 字段），便于在 JSON 配置文件中维护。
//!
//! ```json
//! {
//!   "retry": {
//!     "max_retries": 3,
//!     "backoff": { "kind": "exponential", "base_delay_ms": 1000, "max_delay_ms": 10000, "jitter_factor": 0.25 }
//!   },
//!   "attempt_timeout_ms": 30000,
//!   "max_concurrency": 64
//! }
//! ```
//!
use crate::error::{DispatchError, DispatchResult};
use crate::eventing::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// 全局默认重试策略（可在注册处理器时单独覆盖）
    pub retry: RetryPolicy,
    /// 单次处理器调用的超时；超时按处理失败计入重试
    #[serde(rename = "attempt_timeout_ms", with = "duration_ms::option")]
    pub attempt_timeout: Option<Duration>,
    /// 内存执行器同时运行的投递尝试上限
    pub max_concurrency: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            attempt_timeout: None,
            max_concurrency: 64,
        }
    }
}

impl DispatchConfig {
    pub fn from_json_str(raw: &str) -> DispatchResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> DispatchResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> DispatchResult<()> {
        if self.max_concurrency == 0 {
            return Err(DispatchError::invalid_config(
                "max_concurrency must be greater than zero",
            ));
        }
        if self.attempt_timeout == Some(Duration::ZERO) {
            return Err(DispatchError::invalid_config(
                "attempt_timeout must be greater than zero when set",
            ));
        }
        self.retry.validate()
    }
}

/// 以毫秒整数（反）序列化 `Duration`
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    fn to_millis(d: &Duration) -> u64 {
        u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(to_millis(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => serializer.serialize_some(&to_millis(d)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
        }
    }

    pub mod seq {
        use super::*;
        use serde::Serialize;

        pub fn serialize<S: Serializer>(
            value: &[Duration],
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            let millis: Vec<u64> = value.iter().map(to_millis).collect();
            millis.serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<Duration>, D::Error> {
            Ok(Vec::<u64>::deserialize(deserializer)?
                .into_iter()
                .map(Duration::from_millis)
                .collect())
        }
    }
}
