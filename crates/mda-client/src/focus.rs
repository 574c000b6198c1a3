//! # 对焦生命周期
//!
//! "对焦一次，然后冻结"：
//!
//! ```text
//! Unknown → Acquiring → Acquired | AcquireFailed      （半按获取，之后必定松开）
//! AFEnabled → AFDisabled                                （会话内单向）
//! ```
//!
//! ⚠️ 半按绝不能保持锁存：[`acquire`] 无论结果如何都会松开快门。

use crate::error::{CaptureError, Result};
use crate::state::{FocusState, SessionState};
use mda_device::{DeviceChannel, DeviceErrorKind};
use mda_driver::{Camera, RetryError};
use mda_protocol::{AfMode, DeviceCommand, EvfOutput, PropertyId};
use std::time::Duration;
use tracing::{debug, info, warn};

/// 半按获取对焦，然后松开
///
/// 自动对焦已关闭时拒绝执行（不下发任何命令）。
/// 只有连接级错误会返回 `Err`；其他失败记为 `AcquireFailed`。
pub fn acquire<D: DeviceChannel>(
    camera: &mut Camera<D>,
    state: &mut SessionState,
    wait: Duration,
) -> Result<FocusState> {
    if state.af_disabled {
        warn!("Half-press ignored (AF already disabled)");
        return Ok(FocusState::AcquireFailed);
    }

    state.focus = FocusState::Acquiring;
    let result = camera.half_press(wait);
    let _ = camera.release_shutter();

    state.focus = match &result {
        Ok(()) => {
            state.focus_acquisitions += 1;
            info!("Focus acquired");
            FocusState::Acquired
        },
        Err(e) => {
            warn!("Focus attempt failed: {}", e);
            FocusState::AcquireFailed
        },
    };

    match result {
        Err(RetryError::Fatal(e)) if e.is_fatal() => Err(CaptureError::Device(e)),
        _ => Ok(state.focus),
    }
}

/// 用当前值重写实时取景输出设备（刷新取景）
pub fn refresh_evf_output<D: DeviceChannel>(camera: &mut Camera<D>) -> bool {
    match camera.read(PropertyId::EvfOutputDevice) {
        Ok(current) => camera.set_best_effort(PropertyId::EvfOutputDevice, current),
        Err(e) => {
            debug!("EVF refresh skipped: {}", e);
            false
        },
    }
}

/// 关闭全部自动对焦（冻结对焦）
///
/// 四个 AF 相关属性逐个置 0，每次写入单独包在 UI 锁内；机身不支持的属性跳过。
/// 然后刷新取景输出，尽力切换到手动对焦模式，再刷新一次。
/// 已关闭时不重复执行。
pub fn disable_af<D: DeviceChannel>(camera: &mut Camera<D>, state: &mut SessionState) {
    if state.af_disabled {
        debug!("Autofocus already disabled");
        return;
    }
    info!("Disabling autofocus for the rest of the session");

    let settle = camera.config().af_property_settle_ms;
    for property in PropertyId::AUTOFOCUS {
        match camera.with_ui_lock(|cam| cam.set(property, 0)) {
            Ok(()) => info!("{}=Off", property),
            Err(e) if e.kind == DeviceErrorKind::NotSupported => {
                debug!("{} not supported on this body, skipped", property)
            },
            Err(e) => warn!("{} set failed: {}", property, e),
        }
        camera.pump_ms(settle);
    }
    refresh_evf_output(camera);

    if camera.set_best_effort(PropertyId::AfMode, AfMode::Manual.into()) {
        info!("AFMode -> 3 (Manual Focus)");
    }
    if refresh_evf_output(camera) {
        info!("EVF refreshed to freeze focus state");
    }

    state.af_disabled = true;
    info!("Focus locked; all subsequent shots are NON-AF");
}

/// 重新启用自动对焦并清除残留的半按锁定（仅在会话开始时使用）
///
/// 每一步都容忍失败。
pub fn reset_af<D: DeviceChannel>(camera: &mut Camera<D>, state: &mut SessionState) {
    info!("Resetting AF / focus system");
    for property in PropertyId::AUTOFOCUS {
        match camera.set(property, 1) {
            Ok(()) => info!("{} -> 1 (enabled)", property),
            Err(e) => debug!("Could not enable {}: {}", property, e),
        }
    }
    if camera.set_best_effort(PropertyId::AfMode, AfMode::OneShot.into()) {
        info!("AFMode -> 0 (One-Shot AF)");
    }

    camera.set_best_effort(PropertyId::EvfMode, 1);
    camera.set_best_effort(PropertyId::EvfOutputDevice, EvfOutput::Pc.into());
    match camera.send(DeviceCommand::DoEvfAf(true)) {
        Ok(()) => {
            camera.pump_ms(camera.config().af_pulse_ms);
            if let Err(e) = camera.send(DeviceCommand::DoEvfAf(false)) {
                debug!("AF pulse off failed: {}", e);
            }
            info!("AF pulse sent to re-initialize lens drive");
        },
        Err(e) => debug!("AF pulse skipped: {}", e),
    }
    let _ = camera.release_shutter();

    state.af_disabled = false;
    state.focus = FocusState::Unknown;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::mock_camera;
    use mda_device::mock::{CommandBehavior, MockEvent, SetBehavior};
    use mda_protocol::ShutterButton;

    const HALF: DeviceCommand = DeviceCommand::PressShutter(ShutterButton::Halfway);

    #[test]
    fn test_acquire_releases_on_success() {
        let (mut camera, device, _clock) = mock_camera();
        let mut state = SessionState::new();
        let focus = acquire(&mut camera, &mut state, Duration::from_millis(1100)).unwrap();
        assert_eq!(focus, FocusState::Acquired);
        assert_eq!(state.focus_acquisitions, 1);
        let commands = device.commands();
        let half = commands.iter().position(|c| *c == HALF).unwrap();
        assert!(commands[half..].contains(&DeviceCommand::RELEASE));
    }

    #[test]
    fn test_acquire_releases_on_failure() {
        let (mut camera, device, _clock) = mock_camera();
        device.script_commands(HALF, std::iter::repeat_n(CommandBehavior::Busy, 6));
        let mut state = SessionState::new();
        let focus = acquire(&mut camera, &mut state, Duration::from_millis(1100)).unwrap();
        assert_eq!(focus, FocusState::AcquireFailed);
        assert_eq!(state.focus_acquisitions, 0);
        assert_eq!(device.commands().last(), Some(&DeviceCommand::RELEASE));
        assert_eq!(device.commands().iter().filter(|c| **c == HALF).count(), 6);
    }

    #[test]
    fn test_acquire_refused_after_af_disabled() {
        let (mut camera, device, _clock) = mock_camera();
        let mut state = SessionState::new();
        state.af_disabled = true;
        let focus = acquire(&mut camera, &mut state, Duration::from_millis(1100)).unwrap();
        assert_eq!(focus, FocusState::AcquireFailed);
        assert!(device.commands().is_empty());
    }

    #[test]
    fn test_disable_af_sets_all_properties_off() {
        let (mut camera, device, _clock) = mock_camera();
        let mut state = SessionState::new();
        disable_af(&mut camera, &mut state);

        assert!(state.af_disabled);
        for property in PropertyId::AUTOFOCUS {
            assert_eq!(device.value(property), Some(0), "{}", property);
        }
        assert_eq!(device.value(PropertyId::AfMode), Some(3));
        // 每个属性写入都被 UI 锁包围
        let events = device.events();
        for property in PropertyId::AUTOFOCUS {
            let i = events
                .iter()
                .position(|e| matches!(e, MockEvent::Set { property: p, .. } if *p == property))
                .unwrap();
            assert!(matches!(
                events[i - 1],
                MockEvent::Command { command: DeviceCommand::UiLock, .. }
            ));
            assert!(matches!(
                events[i + 1],
                MockEvent::Command { command: DeviceCommand::UiUnlock, .. }
            ));
        }
    }

    #[test]
    fn test_disable_af_tolerates_missing_properties() {
        let (mut camera, device, _clock) = mock_camera();
        device.mark_unsupported(PropertyId::MovieServoAf);
        device.script_sets(PropertyId::AfAssist, [SetBehavior::Fail(DeviceErrorKind::Backend)]);
        device.mark_unsupported(PropertyId::AfMode);
        let mut state = SessionState::new();
        disable_af(&mut camera, &mut state);

        assert!(state.af_disabled);
        assert_eq!(device.value(PropertyId::ContinuousAfMode), Some(0));
        assert_eq!(device.value(PropertyId::LensDriveWhenAfImpossible), Some(0));
        assert_eq!(device.value(PropertyId::AfAssist), Some(1));
    }

    #[test]
    fn test_disable_af_is_one_way() {
        let (mut camera, device, _clock) = mock_camera();
        let mut state = SessionState::new();
        disable_af(&mut camera, &mut state);
        let writes = device.set_calls(PropertyId::ContinuousAfMode).len();
        disable_af(&mut camera, &mut state);
        assert_eq!(device.set_calls(PropertyId::ContinuousAfMode).len(), writes);
    }

    #[test]
    fn test_reset_af_reenables_and_pulses() {
        let (mut camera, device, _clock) = mock_camera();
        let mut state = SessionState::new();
        disable_af(&mut camera, &mut state);
        reset_af(&mut camera, &mut state);

        assert!(!state.af_disabled);
        for property in PropertyId::AUTOFOCUS {
            assert_eq!(device.value(property), Some(1));
        }
        assert_eq!(device.value(PropertyId::AfMode), Some(0));
        assert_eq!(device.value(PropertyId::EvfOutputDevice), Some(2));
        let commands = device.commands();
        let on = commands
            .iter()
            .position(|c| *c == DeviceCommand::DoEvfAf(true))
            .unwrap();
        let off = commands
            .iter()
            .position(|c| *c == DeviceCommand::DoEvfAf(false))
            .unwrap();
        assert!(on < off);
    }
}
