//! # 变焦斜坡状态机
//!
//! ```text
//! Idle → Ramping → (Settled | Stalled) → [Recovering → Ramping] → Done | Failed
//! ```
//!
//! - 进入时读取当前位置；已在目标位置则直接 `Settled`（零次写入）
//! - `Ramping`：按 `min(步长, 剩余距离)` 单调逐步写入校验，整个斜坡包在 UI 锁内
//! - 任一步写入校验失败 → `Stalled`
//! - 第一次停滞：重置实时取景后从当前位置整体重试一次（`Recovering`）；
//!   恢复后再次停滞即终止，不再自动重试
//! - 无论成败，最后执行可选的静置等待

use crate::error::{CaptureError, Result};
use crate::state::SessionState;
use mda_device::DeviceChannel;
use mda_driver::{Camera, DriverError};
use mda_protocol::zoom::{ZoomRange, plan_ramp};
use mda_protocol::{PropertyCode, PropertyId};
use std::time::Duration;
use tracing::{debug, info, warn};

/// 斜坡状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampState {
    Idle,
    Ramping,
    Settled,
    Stalled,
    Recovering,
    Done,
    Failed,
}

/// 一次斜坡的执行记录
#[derive(Debug)]
pub struct RampReport {
    /// 请求的目标（已限制在设备范围内）
    pub target: PropertyCode,
    /// 第一次读取到的起始位置
    pub start: Option<PropertyCode>,
    /// 最后确认的位置
    pub final_position: Option<PropertyCode>,
    /// 写入次数（含校验重试）
    pub write_attempts: u32,
    /// 确认成功的中间步数
    pub steps_verified: u32,
    /// 是否执行过恢复
    pub recovered: bool,
    /// 状态迁移轨迹
    pub transitions: Vec<RampState>,
    /// 失败原因（`Failed` 时）
    pub error: Option<CaptureError>,
}

impl RampReport {
    fn new(target: PropertyCode) -> Self {
        Self {
            target,
            start: None,
            final_position: None,
            write_attempts: 0,
            steps_verified: 0,
            recovered: false,
            transitions: vec![RampState::Idle],
            error: None,
        }
    }

    fn enter(&mut self, next: RampState) {
        debug!("Zoom ramp: {:?} -> {:?}", self.state(), next);
        self.transitions.push(next);
    }

    /// 当前（最终）状态
    pub fn state(&self) -> RampState {
        self.transitions.last().copied().unwrap_or(RampState::Idle)
    }

    pub fn is_done(&self) -> bool {
        self.state() == RampState::Done
    }

    /// `Done` → 最终位置；`Failed` → 失败原因
    pub fn into_result(self) -> Result<PropertyCode> {
        match (self.error, self.final_position) {
            (Some(e), _) => Err(e),
            (None, Some(position)) => Ok(position),
            (None, None) => Err(CaptureError::RampFailed {
                step: None,
                reason: "ramp did not run".to_string(),
            }),
        }
    }
}

/// 变焦斜坡
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomRamp {
    target: PropertyCode,
    step: Option<u32>,
    quiet_settle: Duration,
}

impl ZoomRamp {
    pub fn new(target: PropertyCode) -> Self {
        Self {
            target,
            step: None,
            quiet_settle: Duration::ZERO,
        }
    }

    /// 覆盖步长（默认取驱动配置）
    pub fn step(mut self, step: u32) -> Self {
        self.step = Some(step);
        self
    }

    /// 斜坡结束后的静置等待
    pub fn quiet_settle(mut self, duration: Duration) -> Self {
        self.quiet_settle = duration;
        self
    }

    /// 执行斜坡并返回最终位置
    pub fn execute<D: DeviceChannel>(
        &self,
        camera: &mut Camera<D>,
        state: &mut SessionState,
    ) -> Result<PropertyCode> {
        self.run(camera, state).into_result()
    }

    /// 执行斜坡并返回完整记录
    pub fn run<D: DeviceChannel>(
        &self,
        camera: &mut Camera<D>,
        state: &mut SessionState,
    ) -> RampReport {
        let range = ZoomRange::from_values(&camera.describe(PropertyId::Zoom));
        let target = range.clamp_target(self.target);
        if target != self.target {
            warn!(
                "Zoom target {} beyond device range 0..{}; using {}",
                self.target, range.max_step, target
            );
        }
        info!(
            "DC_Zoom: total={}, range 0..{}, target={}",
            range.total, range.max_step, target
        );

        let mut report = RampReport::new(target);
        let step = self.step.unwrap_or(camera.config().zoom_ramp_step);

        let mut outcome = self.attempt(camera, state, target, step, &mut report);
        if let Err(e) = &outcome {
            if e.is_fatal() {
                warn!("Zoom ramp aborted: {}", e);
            } else {
                info!("Zoom ramp: first attempt failed ({}); resetting live view and retrying", e);
                report.enter(RampState::Recovering);
                report.recovered = true;
                camera.reset_liveview();
                camera.pump_ms(camera.config().ramp_recovery_pause_ms);
                outcome = self.attempt(camera, state, target, step, &mut report);
            }
        }

        match outcome {
            Ok(position) => {
                report.final_position = Some(position);
                report.enter(RampState::Done);
                info!("Zoom ramp complete at {}", position);
            },
            Err(e) => {
                warn!("Zoom ramp failed: {}", e);
                report.error = Some(e);
                report.enter(RampState::Failed);
            },
        }

        if !self.quiet_settle.is_zero() {
            info!("Quiet settle {:.1}s", self.quiet_settle.as_secs_f64());
            camera.pump(self.quiet_settle);
        }
        report
    }

    /// 单次斜坡：读取 → 逐步写入校验（UI 锁内）→ 稳定等待
    fn attempt<D: DeviceChannel>(
        &self,
        camera: &mut Camera<D>,
        state: &mut SessionState,
        target: PropertyCode,
        step: u32,
        report: &mut RampReport,
    ) -> Result<PropertyCode> {
        // 斜坡期间绝不保持半按
        let _ = camera.release_shutter();
        camera.wake();
        camera.pump_ms(camera.config().zoom_prepare_ms);

        let current = match camera.read(PropertyId::Zoom) {
            Ok(current) => current,
            Err(e) => {
                report.enter(RampState::Stalled);
                if e.is_fatal() {
                    return Err(CaptureError::Device(e));
                }
                return Err(CaptureError::RampFailed {
                    step: None,
                    reason: format!("cannot read zoom: {e}"),
                });
            },
        };
        report.start.get_or_insert(current);
        state.zoom = Some(current);

        if current == target {
            info!("Zoom already at {}", current);
            report.enter(RampState::Settled);
            camera.pump_ms(camera.config().post_zoom_settle_ms);
            return Ok(current);
        }

        report.enter(RampState::Ramping);
        let attempts = camera.config().zoom_verify_attempts;
        let pause = camera.config().zoom_step_pause_ms;
        let steps = plan_ramp(current, target, step);

        let result = camera.with_ui_lock(|cam| {
            for position in steps {
                match cam.write_verified(PropertyId::Zoom, position, attempts) {
                    Ok(written) => {
                        report.write_attempts += written.attempts;
                        report.steps_verified += 1;
                        state.zoom = Some(position);
                        info!("  zoom write -> {} : OK", position);
                    },
                    Err(e) => {
                        report.write_attempts += match &e {
                            DriverError::VerifyFailed { attempts, .. } => *attempts,
                            _ => 1,
                        };
                        info!("  zoom write -> {} : FAIL", position);
                        if e.is_fatal() {
                            return Err(CaptureError::Driver(e));
                        }
                        debug!("Zoom step {} failed: {}", position, e);
                        return Err(CaptureError::RampFailed {
                            step: Some(position),
                            reason: format!("write failed at step {position}"),
                        });
                    },
                }
                cam.pump_ms(pause);
            }
            Ok(target)
        });

        match result {
            Ok(position) => {
                report.enter(RampState::Settled);
                camera.pump_ms(camera.config().post_zoom_settle_ms);
                Ok(position)
            },
            Err(e) => {
                report.enter(RampState::Stalled);
                Err(e)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::mock_camera;
    use mda_device::mock::{MockDevice, MockEvent, SetBehavior};
    use mda_protocol::{DeviceCommand, EvfOutput};

    fn liveview_resets(device: &MockDevice) -> usize {
        device
            .set_calls(PropertyId::EvfOutputDevice)
            .into_iter()
            .filter(|c| *c == u32::from(EvfOutput::Off))
            .count()
    }

    #[test]
    fn test_ramp_reaches_target_in_planned_steps() {
        let (mut camera, device, _clock) = mock_camera();
        let mut state = SessionState::new();
        let report = ZoomRamp::new(10).run(&mut camera, &mut state);

        assert!(report.is_done());
        assert_eq!(report.final_position, Some(10));
        assert_eq!(report.write_attempts, 4);
        assert_eq!(device.set_calls(PropertyId::Zoom), vec![3, 6, 9, 10]);
        assert_eq!(device.value(PropertyId::Zoom), Some(10));
        assert_eq!(state.zoom, Some(10));
        assert_eq!(
            report.transitions,
            vec![RampState::Idle, RampState::Ramping, RampState::Settled, RampState::Done]
        );
    }

    #[test]
    fn test_ramp_downward() {
        let (mut camera, device, _clock) = mock_camera();
        device.set_value(PropertyId::Zoom, 140);
        let position = ZoomRamp::new(134)
            .execute(&mut camera, &mut SessionState::new())
            .unwrap();
        assert_eq!(position, 134);
        assert_eq!(device.set_calls(PropertyId::Zoom), vec![137, 134]);
    }

    #[test]
    fn test_target_equals_current_writes_nothing() {
        let (mut camera, device, _clock) = mock_camera();
        device.set_value(PropertyId::Zoom, 55);
        let report = ZoomRamp::new(55).run(&mut camera, &mut SessionState::new());

        assert!(report.is_done());
        assert_eq!(report.write_attempts, 0);
        assert!(device.set_calls(PropertyId::Zoom).is_empty());
        // 没有写入就不需要 UI 锁
        assert!(!device.commands().contains(&DeviceCommand::UiLock));
        assert_eq!(
            report.transitions,
            vec![RampState::Idle, RampState::Settled, RampState::Done]
        );
    }

    #[test]
    fn test_ramp_is_bracketed_by_ui_lock() {
        let (mut camera, device, _clock) = mock_camera();
        ZoomRamp::new(6).execute(&mut camera, &mut SessionState::new()).unwrap();
        let events = device.events();
        let lock = events
            .iter()
            .position(|e| matches!(e, MockEvent::Command { command: DeviceCommand::UiLock, .. }))
            .unwrap();
        let unlock = events
            .iter()
            .rposition(|e| {
                matches!(e, MockEvent::Command { command: DeviceCommand::UiUnlock, .. })
            })
            .unwrap();
        let zoom_writes: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, MockEvent::Set { property: PropertyId::Zoom, .. }))
            .map(|(i, _)| i)
            .collect();
        assert!(zoom_writes.iter().all(|i| *i > lock && *i < unlock));
    }

    #[test]
    fn test_target_clamped_to_device_range() {
        let (mut camera, device, _clock) = mock_camera();
        device.set_description(PropertyId::Zoom, [11]);
        device.set_value(PropertyId::Zoom, 8);
        let report = ZoomRamp::new(140).run(&mut camera, &mut SessionState::new());
        assert_eq!(report.target, 10);
        assert_eq!(report.final_position, Some(10));
    }

    #[test]
    fn test_single_stall_recovers_once() {
        let (mut camera, device, _clock) = mock_camera();
        // 第二步连续 12 次被忽略 → 停滞；恢复后正常
        device.script_sets(PropertyId::Zoom, [SetBehavior::Accept]);
        device.script_sets(PropertyId::Zoom, std::iter::repeat_n(SetBehavior::Ignore, 12));
        let report = ZoomRamp::new(9).run(&mut camera, &mut SessionState::new());

        assert!(report.is_done(), "report: {:?}", report);
        assert!(report.recovered);
        assert_eq!(liveview_resets(&device), 1);
        assert_eq!(
            report
                .transitions
                .iter()
                .filter(|s| **s == RampState::Recovering)
                .count(),
            1
        );
        assert_eq!(device.value(PropertyId::Zoom), Some(9));
        // 恢复从当前位置（3）继续
        assert_eq!(report.start, Some(0));
    }

    #[test]
    fn test_second_stall_is_terminal() {
        let (mut camera, device, _clock) = mock_camera();
        device.set_default_behavior(PropertyId::Zoom, SetBehavior::Ignore);
        let report = ZoomRamp::new(9)
            .quiet_settle(Duration::from_millis(800))
            .run(&mut camera, &mut SessionState::new());

        assert_eq!(report.state(), RampState::Failed);
        assert_eq!(liveview_resets(&device), 1);
        // 两次尝试，各 12 次写入
        assert_eq!(device.set_calls(PropertyId::Zoom).len(), 24);
        match report.into_result() {
            Err(CaptureError::RampFailed { step, reason }) => {
                assert_eq!(step, Some(3));
                assert_eq!(reason, "write failed at step 3");
            },
            other => panic!("unexpected: {other:?}"),
        }
        // 失败路径也必须解锁
        let commands = device.commands();
        let locks = commands.iter().filter(|c| **c == DeviceCommand::UiLock).count();
        let unlocks = commands.iter().filter(|c| **c == DeviceCommand::UiUnlock).count();
        assert_eq!(locks, unlocks);
    }

    #[test]
    fn test_unreadable_zoom_fails_after_recovery() {
        let (mut camera, device, _clock) = mock_camera();
        device.mark_unsupported(PropertyId::Zoom);
        let report = ZoomRamp::new(20).run(&mut camera, &mut SessionState::new());
        assert_eq!(report.state(), RampState::Failed);
        assert!(report.recovered);
        match report.into_result() {
            Err(CaptureError::RampFailed { step: None, reason }) => {
                assert!(reason.starts_with("cannot read zoom"));
            },
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_ramp_never_leaves_half_press() {
        let (mut camera, device, _clock) = mock_camera();
        ZoomRamp::new(6).execute(&mut camera, &mut SessionState::new()).unwrap();
        assert!(device.commands().contains(&DeviceCommand::RELEASE));
        assert!(!device.commands().iter().any(|c| matches!(
            c,
            DeviceCommand::PressShutter(mda_protocol::ShutterButton::Halfway)
        )));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(24))]

            #[test]
            fn ramp_write_count_is_ceil_of_distance(
                start in 0u32..=200,
                target in 0u32..=200,
                step in 1u32..=6,
            ) {
                let (mut camera, device, _clock) = mock_camera();
                device.set_value(PropertyId::Zoom, start);
                let report = ZoomRamp::new(target).step(step).run(&mut camera, &mut SessionState::new());
                prop_assert!(report.is_done());
                prop_assert_eq!(report.final_position, Some(target));
                prop_assert_eq!(report.write_attempts, start.abs_diff(target).div_ceil(step));
            }
        }
    }
}
