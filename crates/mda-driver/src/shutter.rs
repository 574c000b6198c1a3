//! 快门原语：半按（对焦）与不触发自动对焦的全按拍摄
//!
//! ⚠️ 每一条按下路径都必须有对应的松开，包括失败路径，否则设备会保持按下状态直到下次运行。

use crate::camera::Camera;
use crate::config::ms;
use crate::retry::RetryError;
use mda_device::DeviceChannel;
use mda_protocol::{DeviceCommand, ShutterButton};
use std::time::Duration;
use tracing::{info, warn};

impl<D: DeviceChannel> Camera<D> {
    /// 半按快门并等待 `wait`（对焦）
    ///
    /// 先唤醒通道；busy 时按半按策略退避，每次退避后重新唤醒。
    /// 不负责松开，调用方必须随后调用 [`Camera::release_shutter`]。
    pub fn half_press(&mut self, wait: Duration) -> Result<(), RetryError> {
        self.wake();
        self.pump_ms(self.config().half_press_prepare_ms);
        let policy = self.config().half_press_retry;
        let result = self.with_busy_retry(
            policy,
            |cam, _| {
                cam.send(DeviceCommand::PressShutter(ShutterButton::Halfway))?;
                cam.pump(wait);
                Ok(())
            },
            |cam, _| cam.wake(),
        );
        match &result {
            Ok(()) => info!("Half-press held for {:.2}s", wait.as_secs_f64()),
            Err(RetryError::Exhausted { .. }) => {
                warn!("Half-press failed: device busy (exhausted retries)")
            },
            Err(RetryError::Fatal(e)) => warn!("Half-press failed: {}", e),
        }
        result
    }

    /// 不触发自动对焦的全按拍摄
    ///
    /// 按下 → 保持 → 松开；busy 时按拍摄策略退避并 ping。无论成败最后都松开快门。
    pub fn capture_non_af(&mut self) -> Result<(), RetryError> {
        let hold = ms(self.config().capture_hold_ms);
        let policy = self.config().capture_retry;
        let result = self.with_busy_retry(
            policy,
            |cam, _| {
                cam.send(DeviceCommand::PressShutter(ShutterButton::CompletelyNonAf))?;
                cam.pump(hold);
                Ok(())
            },
            |cam, _| cam.ping(),
        );
        let _ = self.release_shutter();
        if let Err(e) = &result {
            warn!("Non-AF capture failed: {}", e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::mock_camera;
    use mda_device::DeviceErrorKind;
    use mda_device::mock::CommandBehavior;
    use mda_protocol::{DeviceCommand, ShutterButton};
    use std::time::Duration;

    const HALF: DeviceCommand = DeviceCommand::PressShutter(ShutterButton::Halfway);
    const FULL: DeviceCommand = DeviceCommand::PressShutter(ShutterButton::CompletelyNonAf);

    fn shutter_commands(device: &mda_device::mock::MockDevice) -> Vec<DeviceCommand> {
        device
            .commands()
            .into_iter()
            .filter(|c| matches!(c, DeviceCommand::PressShutter(_)))
            .collect()
    }

    #[test]
    fn test_half_press_busy_then_success() {
        let (mut camera, device, _clock) = mock_camera();
        device.script_commands(HALF, [CommandBehavior::Busy, CommandBehavior::Busy]);
        camera.half_press(Duration::from_millis(1100)).unwrap();
        assert_eq!(shutter_commands(&device), vec![HALF, HALF, HALF]);
    }

    #[test]
    fn test_half_press_non_busy_aborts() {
        let (mut camera, device, _clock) = mock_camera();
        device.script_commands(HALF, [CommandBehavior::Fail(DeviceErrorKind::Backend)]);
        let err = camera.half_press(Duration::from_millis(1100)).unwrap_err();
        assert!(!err.is_exhausted());
        assert_eq!(shutter_commands(&device), vec![HALF]);
    }

    #[test]
    fn test_capture_releases_after_success() {
        let (mut camera, device, _clock) = mock_camera();
        camera.capture_non_af().unwrap();
        assert_eq!(shutter_commands(&device), vec![FULL, DeviceCommand::RELEASE]);
        assert_eq!(device.capture_count(), 1);
    }

    #[test]
    fn test_capture_releases_after_exhaustion() {
        let (mut camera, device, _clock) = mock_camera();
        device.script_commands(FULL, std::iter::repeat_n(CommandBehavior::Busy, 6));
        let err = camera.capture_non_af().unwrap_err();
        assert!(err.is_exhausted());
        let commands = shutter_commands(&device);
        assert_eq!(commands.len(), 7);
        assert_eq!(commands.last(), Some(&DeviceCommand::RELEASE));
        assert_eq!(device.capture_count(), 0);
    }

    #[test]
    fn test_capture_releases_after_fatal() {
        let (mut camera, device, _clock) = mock_camera();
        device.script_commands(FULL, [CommandBehavior::Fail(DeviceErrorKind::Backend)]);
        assert!(camera.capture_non_af().is_err());
        assert_eq!(shutter_commands(&device), vec![FULL, DeviceCommand::RELEASE]);
    }
}
