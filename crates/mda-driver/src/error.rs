//! 驱动层错误类型定义

use mda_device::DeviceError;
use mda_protocol::{PropertyCode, PropertyId, ProtocolError};
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 设备通道错误（非 busy，立即中止当前操作）
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// 协议层错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// busy 重试耗尽
    #[error("{operation}: device busy after {attempts} attempts ({last})")]
    BusyExhausted {
        operation: &'static str,
        attempts: u32,
        last: DeviceError,
    },

    /// 写入校验失败（重试耗尽，回读仍不等于目标）
    #[error("{property}: write-verify failed for {target} after {attempts} attempts (readback {readback:?})")]
    VerifyFailed {
        property: PropertyId,
        target: PropertyCode,
        readback: Option<PropertyCode>,
        attempts: u32,
    },

    /// 本地 IO 错误（捕获目录扫描等）
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// 连接级错误（运行无法继续）
    pub fn is_fatal(&self) -> bool {
        match self {
            DriverError::Device(e) => e.is_fatal(),
            _ => false,
        }
    }
}
