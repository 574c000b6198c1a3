//! 客户端接口模块
//!
//! 本模块在驱动层原语之上实现整次捕获流程，包括：
//! - 变焦斜坡状态机（UI 锁包围、逐步写入校验、一次性复位恢复）
//! - 对焦生命周期（"对焦一次，然后冻结"）
//! - 拍摄流水线（快门 → 变焦 → 光圈 → ISO → 非 AF 拍摄 → 资产收集 → 日志）
//! - Type State Pattern 的捕获会话（编译期保证宏观顺序）
//!
//! # 使用场景
//!
//! 大多数调用方只需要 [`run_capture`]：
//!
//! ```rust,ignore
//! let config = CaptureConfig::load(path)?.resolve()?;
//! let plan = ShotPlan::from_config(&config);
//! let options = SessionOptions::from_config(&config, &capture_dir);
//! let summary = run_capture(&mut backend, options, &plan, &mut log, &mut AutoProceed)?;
//! ```
//!
//! 需要在拍摄之间插入自定义逻辑时，直接使用 [`CaptureSession`] 的各个阶段。

pub mod error;
pub mod exposure;
pub mod focus;
pub mod gate;
pub mod plan;
pub mod session;
pub mod shot;
pub mod sink;
pub mod state;
pub mod zoom;

// 重新导出常用类型
pub use error::{CaptureError, Result};
pub use exposure::ExposureSetting;
pub use gate::{AutoProceed, GateDecision, ShotGate};
pub use plan::{PlannedShot, ShotPlan};
pub use session::{
    CaptureSession, Connected, FocusLocked, LiveView, RunSummary, SessionOptions, SessionTiming,
    run_capture,
};
pub use shot::{AssetHandoff, ShotPipeline, ShotRequest, ShotResult};
pub use sink::{MemorySink, ShotSink};
pub use state::{FocusState, SessionState};
pub use zoom::{RampReport, RampState, ZoomRamp};

#[cfg(test)]
pub(crate) mod test_support {
    use mda_device::mock::MockDevice;
    use mda_driver::{Camera, CameraBuilder, ManualClock};
    use std::sync::Arc;

    /// Mock 设备 + 手动时钟的相机；返回设备和时钟的克隆用于断言
    pub fn mock_camera() -> (Camera<MockDevice>, MockDevice, ManualClock) {
        let device = MockDevice::new();
        let clock = ManualClock::new();
        let camera = CameraBuilder::new()
            .clock(Arc::new(clock.clone()))
            .build(device.clone());
        (camera, device, clock)
    }
}
