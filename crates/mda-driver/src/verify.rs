//! 属性写入校验协议
//!
//! 写入 → 保活等待 → 回读；回读等于目标即成功。
//! 设备经常接受写入但需要更长时间才能在回读中体现，所以每次重试的两段等待都递增：
//! 回读前 `0.24 + 0.12·k` 秒，失败后 `0.28 + 0.14·k` 秒。

use crate::camera::Camera;
use crate::error::DriverError;
use mda_device::DeviceChannel;
use mda_protocol::{PropertyCode, PropertyId};
use tracing::{debug, trace, warn};

/// 写入校验结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReport {
    /// 实际写入次数（含成功的那次）
    pub attempts: u32,
    /// 最终回读值（等于目标）
    pub readback: PropertyCode,
}

impl<D: DeviceChannel> Camera<D> {
    /// 写入并回读确认
    ///
    /// - busy 写入失败计为一次尝试并继续
    /// - 回读失败或不等于目标计为一次尝试并继续
    /// - 非 busy 的写入失败立即返回 `DriverError::Device`
    /// - 尝试耗尽返回 `DriverError::VerifyFailed`
    pub fn write_verified(
        &mut self,
        property: PropertyId,
        target: PropertyCode,
        max_attempts: u32,
    ) -> Result<WriteReport, DriverError> {
        let attempts = max_attempts.max(1);
        let mut last_readback = None;

        for attempt in 0..attempts {
            match self.set(property, target) {
                Ok(()) => {
                    self.pump(self.config().verify_settle(attempt));
                    match self.read(property) {
                        Ok(readback) if readback == target => {
                            trace!(
                                "{}={} verified on attempt {}",
                                property,
                                target,
                                attempt + 1
                            );
                            return Ok(WriteReport {
                                attempts: attempt + 1,
                                readback,
                            });
                        },
                        Ok(readback) => {
                            debug!(
                                "{}: wrote {}, read back {} (attempt {}/{})",
                                property,
                                target,
                                readback,
                                attempt + 1,
                                attempts
                            );
                            last_readback = Some(readback);
                        },
                        Err(e) => debug!("{}: readback failed: {}", property, e),
                    }
                },
                Err(e) if self.classifier().is_busy(&e) => {
                    debug!(
                        "{}: set busy (attempt {}/{})",
                        property,
                        attempt + 1,
                        attempts
                    );
                },
                Err(e) => return Err(DriverError::Device(e)),
            }
            self.pump(self.config().verify_retry(attempt));
        }

        warn!(
            "{}: write-verify of {} failed after {} attempts",
            property, target, attempts
        );
        Err(DriverError::VerifyFailed {
            property,
            target,
            readback: last_readback,
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::mock_camera;
    use mda_device::DeviceErrorKind;
    use mda_device::mock::SetBehavior;
    use proptest::prelude::*;
    use std::time::Duration;

    #[test]
    fn test_first_attempt_success() {
        let (mut camera, device, clock) = mock_camera();
        let report = camera.write_verified(PropertyId::ShutterSpeed, 112, 3).unwrap();
        assert_eq!(report, WriteReport { attempts: 1, readback: 112 });
        assert_eq!(device.set_calls(PropertyId::ShutterSpeed), vec![112]);
        assert_eq!(clock.elapsed(), Duration::from_millis(240));
    }

    #[test]
    fn test_ignored_write_retries_with_growing_waits() {
        let (mut camera, device, clock) = mock_camera();
        device.script_sets(PropertyId::Zoom, [SetBehavior::Ignore, SetBehavior::Ignore]);
        let report = camera.write_verified(PropertyId::Zoom, 3, 12).unwrap();
        assert_eq!(report.attempts, 3);
        // 回读前：240 + 360 + 480；失败后：280 + 420
        assert_eq!(clock.elapsed(), Duration::from_millis(240 + 280 + 360 + 420 + 480));
    }

    #[test]
    fn test_exhausted_reports_last_readback() {
        let (mut camera, device, _clock) = mock_camera();
        device.set_default_behavior(PropertyId::Aperture, SetBehavior::Ignore);
        let err = camera.write_verified(PropertyId::Aperture, 64, 3).unwrap_err();
        match err {
            DriverError::VerifyFailed {
                property,
                target,
                readback,
                attempts,
            } => {
                assert_eq!(property, PropertyId::Aperture);
                assert_eq!(target, 64);
                assert_eq!(readback, Some(56));
                assert_eq!(attempts, 3);
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_busy_failure_aborts() {
        let (mut camera, device, _clock) = mock_camera();
        device.script_sets(
            PropertyId::IsoSpeed,
            [SetBehavior::Fail(DeviceErrorKind::NotSupported)],
        );
        let err = camera.write_verified(PropertyId::IsoSpeed, 0x4b, 3).unwrap_err();
        assert!(matches!(err, DriverError::Device(_)));
        assert_eq!(device.set_calls(PropertyId::IsoSpeed).len(), 1);
    }

    proptest! {
        #[test]
        fn prop_busy_prefix_then_success(busy in 0u32..12) {
            let (mut camera, device, _clock) = mock_camera();
            device.script_sets(PropertyId::Zoom, std::iter::repeat_n(SetBehavior::Busy, busy as usize));
            let report = camera.write_verified(PropertyId::Zoom, 42, 12).unwrap();
            prop_assert_eq!(report.attempts, busy + 1);
            prop_assert_eq!(report.readback, 42);
            prop_assert_eq!(device.set_calls(PropertyId::Zoom).len() as u32, busy + 1);
        }
    }
}
