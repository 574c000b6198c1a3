//! 模拟模式：对 Mock 相机执行完整流程
//!
//! 默认使用手动时钟（所有等待瞬间完成）；`--realtime` 时使用系统时钟。

use mda_device::mock::{MockBackend, MockDevice};
use mda_driver::{Clock, ManualClock, SystemClock};
use std::sync::Arc;

/// 模拟相机和后端；返回设备的克隆用于事后统计
pub fn backend() -> (MockBackend, MockDevice) {
    let device = MockDevice::new();
    (MockBackend::new(device.clone()), device)
}

pub fn clock(realtime: bool) -> Arc<dyn Clock> {
    if realtime {
        Arc::new(SystemClock::new())
    } else {
        Arc::new(ManualClock::new())
    }
}
