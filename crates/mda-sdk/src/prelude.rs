//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use mda_sdk::prelude::*;
//! ```

// 客户端层
pub use mda_client::{
    AutoProceed, CaptureSession, GateDecision, MemorySink, PlannedShot, RunSummary,
    SessionOptions, SessionTiming, ShotGate, ShotPlan, ShotRequest, ShotResult, ShotSink,
    ZoomRamp, run_capture,
};

// 设备通道（常用 Trait）
pub use mda_device::{CameraBackend, DeviceChannel};

// 驱动层
pub use mda_driver::{Camera, DriverConfig};

// 配置与日志
pub use mda_tools::{CaptureConfig, JsonlShotLog, LogHeader, ResolvedConfig, SessionPaths};

// 错误类型
pub use mda_client::CaptureError;
pub use mda_device::DeviceError;
pub use mda_driver::DriverError;
pub use mda_tools::ConfigError;
