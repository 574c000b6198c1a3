//! 命令码定义
//!
//! 快门按键状态、实时取景输出、对焦模式和保存位置的原始码，
//! 以及交给设备适配器的类型化命令 `DeviceCommand`。

use crate::ProtocolError;
use crate::property::PropertyCode;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 快门按键状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum ShutterButton {
    /// 松开
    Off = 0x0000_0000,
    /// 半按（触发自动对焦）
    Halfway = 0x0000_0001,
    /// 全按
    Completely = 0x0000_0003,
    /// 半按，不触发自动对焦
    HalfwayNonAf = 0x0001_0001,
    /// 全按，不触发自动对焦
    CompletelyNonAf = 0x0001_0003,
}

impl ShutterButton {
    /// 是否为"按下"状态（需要配对的松开）
    pub fn is_pressed(self) -> bool {
        self != ShutterButton::Off
    }
}

/// 实时取景输出设备
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum EvfOutput {
    Off = 0,
    /// 机身屏幕
    Tft = 1,
    /// 主机（PC）
    Pc = 2,
}

impl EvfOutput {
    pub fn from_code(code: PropertyCode) -> Result<Self, ProtocolError> {
        Self::try_from(code).map_err(|_| ProtocolError::InvalidValue {
            field: "EvfOutput",
            value: code,
        })
    }
}

/// 对焦模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum AfMode {
    OneShot = 0,
    AiServo = 1,
    AiFocus = 2,
    Manual = 3,
}

impl AfMode {
    pub fn from_code(code: PropertyCode) -> Result<Self, ProtocolError> {
        Self::try_from(code).map_err(|_| ProtocolError::InvalidValue {
            field: "AfMode",
            value: code,
        })
    }
}

/// 图像保存位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum SaveTarget {
    Camera = 1,
    Host = 2,
    Both = 3,
}

/// 向相机声明的主机存储容量
///
/// 保存到主机时，相机需要知道剩余容量才允许拍摄。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapacity {
    pub reset: bool,
    pub bytes_per_sector: u32,
    pub free_clusters: u32,
}

impl HostCapacity {
    /// 声明最大容量（原始做法：512 字节扇区 + i32::MAX 空闲簇）
    pub const fn maximal() -> Self {
        Self {
            reset: true,
            bytes_per_sector: 512,
            free_clusters: 2_147_483_647,
        }
    }
}

impl Default for HostCapacity {
    fn default() -> Self {
        Self::maximal()
    }
}

/// 交给设备适配器的命令
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceCommand {
    /// 快门按键（半按/全按/松开）
    PressShutter(ShutterButton),
    /// 保活：延长自动关机计时器（无副作用）
    ExtendShutDownTimer,
    /// 实时取景自动对焦脉冲（on/off）
    DoEvfAf(bool),
    /// 锁定机身 UI（减少 busy 抖动）
    UiLock,
    /// 解锁机身 UI
    UiUnlock,
}

impl DeviceCommand {
    /// 松开快门
    pub const RELEASE: DeviceCommand = DeviceCommand::PressShutter(ShutterButton::Off);

    /// 命令名（用于日志）
    pub fn name(&self) -> &'static str {
        match self {
            DeviceCommand::PressShutter(ShutterButton::Off) => "ReleaseShutter",
            DeviceCommand::PressShutter(ShutterButton::Halfway) => "HalfPress",
            DeviceCommand::PressShutter(ShutterButton::HalfwayNonAf) => "HalfPressNonAf",
            DeviceCommand::PressShutter(ShutterButton::Completely) => "FullPress",
            DeviceCommand::PressShutter(ShutterButton::CompletelyNonAf) => "FullPressNonAf",
            DeviceCommand::ExtendShutDownTimer => "ExtendShutDownTimer",
            DeviceCommand::DoEvfAf(_) => "DoEvfAf",
            DeviceCommand::UiLock => "UILock",
            DeviceCommand::UiUnlock => "UIUnLock",
        }
    }
}
