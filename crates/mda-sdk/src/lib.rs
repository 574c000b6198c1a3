//! MDA SDK - 相机捕获编排 Rust SDK
//!
//! 在不稳定的相机设备通道上可靠地完成一整次多级变焦拍摄会话。
//!
//! # 架构设计
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **协议层** (`protocol`): 属性、命令、曝光标签表、变焦范围（无硬件依赖）
//! - **设备层** (`device`): 设备通道契约与 Mock 相机
//! - **驱动层** (`driver`): busy 重试、保活泵、写入校验、快门原语
//! - **客户端层** (`client`): 变焦斜坡、对焦生命周期、拍摄流水线、捕获会话
//! - **工具层** (`tools`): 静态配置、拍摄日志
//!
//! # 快速开始
//!
//! ```rust,ignore
//! use mda_sdk::prelude::*;
//!
//! mda_sdk::logging::init();
//! let config = CaptureConfig::load(path)?.resolve()?;
//! let plan = ShotPlan::from_config(&config);
//! let options = SessionOptions::from_config(&config, &capture_dir);
//! let mut log = JsonlShotLog::open(&log_path, &header)?;
//! let summary = run_capture(&mut backend, options, &plan, &mut log, &mut AutoProceed)?;
//! ```

pub mod logging;
pub mod prelude;

pub use mda_client as client;
pub use mda_device as device;
pub use mda_driver as driver;
pub use mda_protocol as protocol;
pub use mda_tools as tools;

// --- 用户以此为界 ---

// 客户端层（推荐入口）
pub use mda_client::{
    AutoProceed, CaptureError, CaptureSession, GateDecision, RunSummary, SessionOptions,
    SessionTiming, ShotGate, ShotPlan, ShotRequest, ShotResult, ShotSink, run_capture,
};

// 设备与驱动层
pub use mda_device::{CameraBackend, DeviceChannel, DeviceError, DeviceErrorKind};
pub use mda_driver::{Camera, DriverConfig, DriverError};

// 工具层
pub use mda_tools::{CaptureConfig, ConfigError, JsonlShotLog, ResolvedConfig, ShotRecord};
