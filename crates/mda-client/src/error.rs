//! 客户端层错误类型定义

use mda_device::DeviceError;
use mda_driver::DriverError;
use mda_protocol::PropertyCode;
use mda_tools::ConfigError;
use thiserror::Error;

/// 捕获会话错误
///
/// 只有连接级错误（没有相机、无法打开会话、会话被关闭）会终止整次运行；
/// 单个属性或单张拍摄的失败由调用方记录后继续。
#[derive(Error, Debug)]
pub enum CaptureError {
    /// 没有检测到相机
    #[error("No camera detected")]
    NoCamera,

    /// 打开会话失败
    #[error("Failed to open session: {0}")]
    SessionOpen(#[source] DeviceError),

    /// 变焦斜坡失败（`step` 为失败时的中间步；无法读取当前位置时为 `None`）
    #[error("Zoom ramp failed: {reason}")]
    RampFailed {
        step: Option<PropertyCode>,
        reason: String,
    },

    /// 驱动层错误
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// 设备通道错误
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// 配置错误
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// 自动对焦尚未关闭时请求拍摄
    #[error("Capture refused: autofocus still enabled")]
    AutofocusActive,

    /// 拍摄日志写入失败
    #[error("Shot log error: {0:#}")]
    Sink(anyhow::Error),

    /// 操作员中止
    #[error("Aborted by operator before '{0}'")]
    Aborted(String),
}

impl CaptureError {
    /// 连接级错误：运行无法继续
    pub fn is_fatal(&self) -> bool {
        match self {
            CaptureError::NoCamera | CaptureError::SessionOpen(_) => true,
            CaptureError::Driver(e) => e.is_fatal(),
            CaptureError::Device(e) => e.is_fatal(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CaptureError>;

#[cfg(test)]
mod tests {
    use super::*;
    use mda_device::DeviceErrorKind;

    #[test]
    fn test_fatal_classification() {
        assert!(CaptureError::NoCamera.is_fatal());
        assert!(CaptureError::SessionOpen(DeviceError::from("locked")).is_fatal());
        assert!(
            CaptureError::Device(DeviceError::new(DeviceErrorKind::SessionClosed, "gone"))
                .is_fatal()
        );
        assert!(!CaptureError::Device(DeviceError::busy("busy")).is_fatal());
        assert!(
            !CaptureError::RampFailed {
                step: Some(12),
                reason: "write failed at step 12".to_string()
            }
            .is_fatal()
        );
        assert!(!CaptureError::Aborted("septum".to_string()).is_fatal());
    }

    #[test]
    fn test_display() {
        let err = CaptureError::RampFailed {
            step: Some(57),
            reason: "write failed at step 57".to_string(),
        };
        assert_eq!(err.to_string(), "Zoom ramp failed: write failed at step 57");
        let err = CaptureError::Sink(anyhow::anyhow!("disk full"));
        assert!(err.to_string().contains("disk full"));
    }
}
