//! # MDA Protocol
//!
//! 相机控制的纯数据层（无硬件依赖）：
//!
//! - `property` - 属性句柄（`PropertyId`）与合法取值集合（`PropertyValueSet`）
//! - `command` - 快门、实时取景、对焦模式等命令码
//! - `exposure` - 快门/光圈/ISO 标签表、标签解析（含最近值回退）、曝光补偿换算
//! - `zoom` - 变焦范围推导与斜坡步进规划
//!
//! 本 crate 只包含查表和纯函数，所有与设备交互的逻辑位于 `mda-driver` / `mda-client`。

pub mod command;
pub mod exposure;
pub mod property;
pub mod zoom;

pub use command::{AfMode, DeviceCommand, EvfOutput, HostCapacity, SaveTarget, ShutterButton};
pub use exposure::{IsoSeries, MatchKind, Resolved};
pub use property::{PropertyCode, PropertyId, PropertyValueSet};
pub use zoom::ZoomRange;

use thiserror::Error;

/// 协议层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// 原始码不属于该枚举
    #[error("Invalid value for {field}: {value:#x}")]
    InvalidValue { field: &'static str, value: u32 },

    /// 变焦范围非法（min > max）
    #[error("Invalid zoom range: {min}..={max}")]
    InvalidRange { min: u32, max: u32 },
}
