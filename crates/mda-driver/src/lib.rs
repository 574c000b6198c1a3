//! # MDA Driver
//!
//! 设备通道之上的可靠性原语：
//!
//! - `retry` - busy 分类与线性退避重试（`retry_busy`、`RetryPolicy`）
//! - `camera` - 相机句柄：保活泵、唤醒、实时取景、UI 锁、主机存储
//! - `verify` - 属性写入校验（写入 → 等待 → 回读，等待逐次递增）
//! - `shutter` - 半按对焦与非 AF 全按拍摄（保证松开）
//! - `hooks` - 资产保存回调与有界通道交接
//! - `assets` - 资产命名与捕获目录回退扫描
//! - `clock` - 可注入时钟（测试用 `ManualClock`）
//! - `config` - 时序配置
//!
//! # 并发模型
//!
//! 单线程驱动设备：所有属性写入、斜坡步进和拍摄严格串行。
//! 唯一的跨上下文交接是资产回调 → 编排线程，经由有界通道完成。

pub mod assets;
pub mod camera;
pub mod clock;
pub mod config;
pub mod error;
pub mod hooks;
pub mod retry;
pub mod shutter;
pub mod verify;

pub use camera::{Camera, CameraBuilder};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::DriverConfig;
pub use error::DriverError;
pub use hooks::{AssetCollector, AssetReceiver};
pub use retry::{BusyClassifier, MarkerClassifier, RetryError, RetryPolicy, retry_busy};
pub use verify::WriteReport;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::{Camera, CameraBuilder, ManualClock};
    use mda_device::mock::MockDevice;
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
