//! 重试策略（RetryPolicy）
//!
//! 纯函数：由尝试序号（从 0 开始）计算下一次重试前的等待时长，并判定是否还有重试预算。
//!
//! 指数退避：`raw = min(base * 2^i, max)`，`delay = raw * (1 + U(-j, +j))`，结果不小于 0。
//!
use crate::config::duration_ms;
use crate::error::{DispatchError, DispatchResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 单次重试延迟（含抖动）允许配置的上限
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// 退避方式
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// 指数退避 + 抖动
    Exponential {
        #[serde(rename = "base_delay_ms", with = "duration_ms")]
        base_delay: Duration,
        #[serde(rename = "max_delay_ms", with = "duration_ms")]
        max_delay: Duration,
        jitter_factor: f64,
    },
    /// 固定延迟表：第 i 次重试使用 `delays[i]`，越界时沿用最后一项
    Fixed {
        #[serde(rename = "delays_ms", with = "duration_ms::seq")]
        delays: Vec<Duration>,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            jitter_factor: 0.25,
        }
    }
}

/// 重试策略：首次尝试之外最多 `max_retries` 次重试（总尝试数 = 1 + max_retries）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    pub fn exponential(
        max_retries: u32,
        base_delay: Duration,
        max_delay: Duration,
        jitter_factor: f64,
    ) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Exponential {
                base_delay,
                max_delay,
                jitter_factor,
            },
        }
    }

    /// 固定延迟表，重试次数即表长
    pub fn fixed(delays: Vec<Duration>) -> Self {
        Self {
            max_retries: u32::try_from(delays.len()).unwrap_or(u32::MAX),
            backoff: Backoff::Fixed { delays },
        }
    }

    /// 不重试
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// 第 `attempt` 次尝试失败后是否还可以重试
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// 未加抖动的延迟（抖动区间的中点）
    pub fn midpoint(&self, attempt: u32) -> Duration {
        match &self.backoff {
            Backoff::Exponential {
                base_delay,
                max_delay,
                ..
            } => 2u32
                .checked_pow(attempt)
                .and_then(|factor| base_delay.checked_mul(factor))
                .map_or(*max_delay, |raw| raw.min(*max_delay)),
            Backoff::Fixed { delays } => {
                let idx = (attempt as usize).min(delays.len().saturating_sub(1));
                delays.get(idx).copied().unwrap_or_default()
            }
        }
    }

    /// 任意尝试序号下延迟的上界：`max_delay * (1 + jitter)`
    pub fn max_envelope(&self) -> Duration {
        match &self.backoff {
            Backoff::Exponential {
                max_delay,
                jitter_factor,
                ..
            } => Duration::try_from_secs_f64(
                max_delay.as_secs_f64() * (1.0 + jitter_factor.max(0.0)),
            )
            .unwrap_or(Duration::MAX),
            Backoff::Fixed { delays } => delays.iter().copied().max().unwrap_or_default(),
        }
    }

    /// 计算第 `attempt` 次失败后的等待时长
    pub fn next_delay(&self, attempt: u32) -> Duration {
        self.next_delay_with(attempt, &mut rand::rng())
    }

    /// 同 `next_delay`，随机源由调用方提供
    pub fn next_delay_with<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let raw = self.midpoint(attempt);
        let jitter = match &self.backoff {
            Backoff::Exponential { jitter_factor, .. } => jitter_factor.max(0.0),
            Backoff::Fixed { .. } => 0.0,
        };
        if jitter == 0.0 || !jitter.is_finite() {
            return raw;
        }

        let factor = 1.0 + jitter * (2.0 * rng.random::<f64>() - 1.0);
        Duration::try_from_secs_f64((raw.as_secs_f64() * factor).max(0.0)).unwrap_or(raw)
    }

    pub fn validate(&self) -> DispatchResult<()> {
        match &self.backoff {
            Backoff::Exponential {
                base_delay,
                max_delay,
                jitter_factor,
            } => {
                if !jitter_factor.is_finite() || *jitter_factor < 0.0 {
                    return Err(DispatchError::invalid_config(format!(
                        "jitter_factor must be a finite non-negative number, got {jitter_factor}"
                    )));
                }
                if base_delay > max_delay {
                    return Err(DispatchError::invalid_config(format!(
                        "base_delay ({base_delay:?}) exceeds max_delay ({max_delay:?})"
                    )));
                }
            }
            Backoff::Fixed { delays } => {
                if delays.is_empty() && self.max_retries > 0 {
                    return Err(DispatchError::invalid_config(
                        "fixed backoff needs at least one delay when retries are enabled",
                    ));
                }
            }
        }
        let envelope = self.max_envelope();
        if envelope > MAX_RETRY_DELAY {
            return Err(DispatchError::invalid_config(format!(
                "retry delay may reach {envelope:?}, above the limit of {MAX_RETRY_DELAY:?}"
            )));
        }
        Ok(())
    }
}
