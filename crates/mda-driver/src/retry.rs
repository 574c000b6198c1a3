//! Busy 重试原语
//!
//! 所有会改变设备状态的调用都通过 [`retry_busy`]：只有被分类为瞬态 busy 的失败才重试，
//! 其他失败立即返回。退避是线性的：第 `k` 次失败后等待 `base + k * increment`。
//!
//! 重试耗尽（[`RetryError::Exhausted`]）与不可重试的失败（[`RetryError::Fatal`]）是两种可区分的结果。

use crate::error::DriverError;
use mda_device::{BUSY_MARKERS, DeviceError, DeviceErrorKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// 重试策略（线性退避）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// 最大尝试次数（含第一次）
    pub max_attempts: u32,
    /// 第一次失败后的等待（毫秒）
    pub base_delay_ms: u64,
    /// 每多失败一次增加的等待（毫秒）
    pub increment_ms: u64,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay_ms: u64, increment_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            increment_ms,
        }
    }

    /// 通用策略：5 次，0.3 s + 0.2 s/次
    pub const fn standard() -> Self {
        Self::new(5, 300, 200)
    }

    /// 半按对焦：6 次，0.35 s + 0.25 s/次
    pub const fn half_press() -> Self {
        Self::new(6, 350, 250)
    }

    /// 全按拍摄：6 次，0.25 s + 0.25 s/次
    pub const fn capture() -> Self {
        Self::new(6, 250, 250)
    }

    /// 第 `attempt` 次（从 0 开始）失败后的等待
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms + self.increment_ms * attempt as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

/// busy 分类器
pub trait BusyClassifier: Send + Sync {
    fn is_busy(&self, error: &DeviceError) -> bool;
}

/// 结构化分类 + 文本标记
///
/// 适配器给出 `DeviceErrorKind::Busy` 时直接判定；否则对 `Unknown` / `Backend` 错误的文本
/// 做不区分大小写的子串匹配。额外标记用于新固件的不同措辞。
#[derive(Debug, Clone, Default)]
pub struct MarkerClassifier {
    extra_markers: Vec<String>,
}

impl MarkerClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extra_markers<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extra_markers: markers
                .into_iter()
                .map(|m| m.as_ref().trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    pub fn markers(&self) -> impl Iterator<Item = &str> {
        BUSY_MARKERS
            .iter()
            .copied()
            .chain(self.extra_markers.iter().map(String::as_str))
    }
}

impl BusyClassifier for MarkerClassifier {
    /// 内置判定见 [`DeviceError::is_busy`]，这里只补充额外标记
    fn is_busy(&self, error: &DeviceError) -> bool {
        if error.is_busy() {
            return true;
        }
        if self.extra_markers.is_empty()
            || !matches!(error.kind, DeviceErrorKind::Unknown | DeviceErrorKind::Backend)
        {
            return false;
        }
        let lower = error.message.to_lowercase();
        self.extra_markers.iter().any(|marker| lower.contains(marker.as_str()))
    }
}

/// 重试结果
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    /// 每次尝试都是 busy，次数耗尽
    #[error("device busy after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: DeviceError },

    /// 非 busy 失败，立即中止
    #[error("non-retryable failure: {0}")]
    Fatal(DeviceError),
}

impl RetryError {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    /// 最后一次设备错误
    pub fn device_error(&self) -> &DeviceError {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Fatal(e) => e,
        }
    }

    /// 转为驱动层错误，`operation` 用于日志
    pub fn into_driver(self, operation: &'static str) -> DriverError {
        match self {
            RetryError::Exhausted { attempts, last } => DriverError::BusyExhausted {
                operation,
                attempts,
                last,
            },
            RetryError::Fatal(e) => DriverError::Device(e),
        }
    }
}

/// 执行 `op`，对 busy 失败按策略退避重试
///
/// - `op(ctx, attempt)`：第 `attempt` 次尝试（从 0 开始）
/// - `backoff(ctx, attempt, delay)`：第 `attempt` 次 busy 失败后、下一次尝试前调用；
///   调用方负责在这里等待 `delay`（通常通过保活泵）并做额外的唤醒
///
/// 最后一次尝试失败后不再退避。
pub fn retry_busy<C, T>(
    ctx: &mut C,
    policy: &RetryPolicy,
    classifier: &dyn BusyClassifier,
    mut op: impl FnMut(&mut C, u32) -> Result<T, DeviceError>,
    mut backoff: impl FnMut(&mut C, u32, Duration),
) -> Result<T, RetryError> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match op(ctx, attempt) {
            Ok(value) => return Ok(value),
            Err(e) if classifier.is_busy(&e) => {
                if attempt + 1 >= attempts {
                    return Err(RetryError::Exhausted {
                        attempts,
                        last: e,
                    });
                }
                let delay = policy.delay_for(attempt);
                debug!(
                    "Busy on attempt {}/{}, retrying in {:.2}s",
                    attempt + 1,
                    attempts,
                    delay.as_secs_f64()
                );
                backoff(ctx, attempt, delay);
                attempt += 1;
            },
            Err(e) => return Err(RetryError::Fatal(e)),
        }
    }
}
