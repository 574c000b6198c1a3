//! # MDA Device Channel Layer
//!
//! 相机设备通道抽象，提供统一的属性读写、命令下发和资产回调接口。
//!
//! 厂商 SDK 绑定只需实现 [`CameraBackend`] 和 [`DeviceChannel`]；
//! 上层的重试、保活、写入校验逻辑全部基于这两个 trait。
//!
//! 启用 `mock` feature 后提供可编程的模拟相机 [`mock::MockDevice`]。

use std::sync::Arc;
use thiserror::Error;

pub use mda_protocol::{DeviceCommand, HostCapacity, PropertyCode, PropertyId, PropertyValueSet};

pub mod asset;

#[cfg(feature = "mock")]
pub mod mock;

pub use asset::{AssetEvent, AssetEventHandler, DirectoryItem};

/// 文本形式的 busy 标记（小写，按子串匹配）
///
/// 只提供字符串错误的适配器依赖这些标记；新固件可能换一种措辞。
pub const BUSY_MARKERS: [&str; 3] = ["device_busy", "eds_err_device_busy", "busy"];

/// 设备错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceErrorKind {
    Unknown,
    /// 设备正忙（瞬态，可重试）
    Busy,
    /// 未找到相机
    NotFound,
    /// 当前机身不支持该属性/命令
    NotSupported,
    /// 会话已关闭
    SessionClosed,
    /// 本地 IO（资产下载）
    Io,
    /// 后端 SDK 返回的其他错误
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct DeviceError {
    pub kind: DeviceErrorKind,
    pub message: String,
}

impl DeviceError {
    pub fn new(kind: DeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn busy(message: impl Into<String>) -> Self {
        Self::new(DeviceErrorKind::Busy, message)
    }

    pub fn not_supported(property: PropertyId) -> Self {
        Self::new(
            DeviceErrorKind::NotSupported,
            format!("property {property} not supported"),
        )
    }

    /// 是否为瞬态 busy
    ///
    /// 优先使用结构化分类；`Unknown` / `Backend` 错误再按 [`BUSY_MARKERS`] 做不区分大小写的子串匹配。
    pub fn is_busy(&self) -> bool {
        match self.kind {
            DeviceErrorKind::Busy => true,
            DeviceErrorKind::Unknown | DeviceErrorKind::Backend => {
                message_is_busy(&self.message)
            },
            _ => false,
        }
    }

    /// 连接级错误（整个运行无法继续）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            DeviceErrorKind::NotFound | DeviceErrorKind::SessionClosed
        )
    }
}

/// 按 busy 标记匹配错误文本
pub fn message_is_busy(message: &str) -> bool {
    let lower = message.to_lowercase();
    BUSY_MARKERS.iter().any(|marker| lower.contains(marker))
}

impl From<String> for DeviceError {
    fn from(message: String) -> Self {
        Self::new(DeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for DeviceError {
    fn from(message: &str) -> Self {
        Self::new(DeviceErrorKind::Unknown, message)
    }
}

impl From<std::io::Error> for DeviceError {
    fn from(err: std::io::Error) -> Self {
        Self::new(DeviceErrorKind::Io, err.to_string())
    }
}

/// 相机设备通道（一个已打开的会话）
///
/// 所有调用都是同步阻塞的；同一设备上的调用必须严格串行。
pub trait DeviceChannel {
    /// 读取属性当前码值
    fn get_property(&mut self, property: PropertyId) -> Result<PropertyCode, DeviceError>;

    /// 写入属性码值（设备可能接受但暂未生效，需回读确认）
    fn set_property(&mut self, property: PropertyId, code: PropertyCode)
    -> Result<(), DeviceError>;

    /// 查询属性的合法取值集合（设备不提供描述时返回空集合）
    fn describe_property(&mut self, property: PropertyId)
    -> Result<PropertyValueSet, DeviceError>;

    /// 下发命令
    fn send_command(&mut self, command: DeviceCommand) -> Result<(), DeviceError>;

    /// 声明主机存储容量
    fn set_capacity(&mut self, capacity: HostCapacity) -> Result<(), DeviceError>;

    /// 安装资产事件回调
    fn set_asset_handler(&mut self, handler: Arc<dyn AssetEventHandler>)
    -> Result<(), DeviceError>;

    /// 派发平台事件队列，让异步回调有机会执行
    ///
    /// 不需要消息泵的平台保持默认实现即可。
    fn dispatch_events(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    /// 关闭会话
    fn close_session(&mut self) -> Result<(), DeviceError>;
}

/// 相机后端（枚举相机并打开会话）
pub trait CameraBackend {
    type Channel: DeviceChannel;

    /// 已连接的相机数量
    fn camera_count(&mut self) -> Result<usize, DeviceError>;

    /// 打开第 `index` 台相机的会话
    fn open_session(&mut self, index: usize) -> Result<Self::Channel, DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_busy() {
        assert!(DeviceError::busy("anything").is_busy());
        assert!(!DeviceError::new(DeviceErrorKind::NotSupported, "busy").is_busy());
    }

    #[test]
    fn test_textual_busy_markers() {
        assert!(DeviceError::from("EDS_ERR_DEVICE_BUSY").is_busy());
        assert!(DeviceError::from("Camera is Busy right now").is_busy());
        assert!(DeviceError::new(DeviceErrorKind::Backend, "0x81 device_busy").is_busy());
        assert!(!DeviceError::from("EDS_ERR_TAKE_PICTURE_AF_NG").is_busy());
    }

    #[test]
    fn test_fatal_kinds() {
        assert!(DeviceError::new(DeviceErrorKind::NotFound, "no camera").is_fatal());
        assert!(DeviceError::new(DeviceErrorKind::SessionClosed, "closed").is_fatal());
        assert!(!DeviceError::busy("busy").is_fatal());
    }

    #[test]
    fn test_io_conversion() {
        let err: DeviceError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert_eq!(err.kind, DeviceErrorKind::Io);
        assert!(err.message.contains("denied"));
    }

    #[test]
    fn test_not_supported_names_property() {
        let err = DeviceError::not_supported(PropertyId::AfAssist);
        assert!(err.to_string().contains("AFAssist"));
    }
}
