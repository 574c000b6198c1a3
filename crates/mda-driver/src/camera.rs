//! 相机句柄：保活泵、唤醒、实时取景和属性读写的基础原语
//!
//! [`Camera`] 独占设备通道，所有设备调用都经由它串行执行。
//! 系统中的所有等待都用 [`Camera::pump`] 表达而不是裸睡眠：
//! 裸睡眠会让设备收不到保活流量，并且异步回调只有在泵的事件派发步骤中才有机会执行。

use crate::clock::{Clock, SystemClock};
use crate::config::{DriverConfig, ms};
use crate::error::DriverError;
use crate::retry::{BusyClassifier, MarkerClassifier, RetryError, RetryPolicy, retry_busy};
use mda_device::{DeviceChannel, DeviceError};
use mda_protocol::{
    DeviceCommand, EvfOutput, HostCapacity, PropertyCode, PropertyId, PropertyValueSet,
    SaveTarget,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// 已打开会话的相机
pub struct Camera<D: DeviceChannel> {
    device: D,
    clock: Arc<dyn Clock>,
    classifier: Arc<dyn BusyClassifier>,
    config: DriverConfig,
    keepalive_failures: u64,
}

impl<D: DeviceChannel> Camera<D> {
    /// 使用默认配置和系统时钟创建
    pub fn new(device: D) -> Self {
        CameraBuilder::new().build(device)
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn classifier(&self) -> &dyn BusyClassifier {
        self.classifier.as_ref()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }

    /// 保活命令失败的累计次数（诊断用）
    pub fn keepalive_failures(&self) -> u64 {
        self.keepalive_failures
    }

    // ==================== 保活 ====================

    /// 发送一次保活命令（失败只计数）
    pub fn ping(&mut self) {
        if let Err(e) = self.device.send_command(DeviceCommand::ExtendShutDownTimer) {
            self.keepalive_failures += 1;
            trace!("Keep-alive ping failed: {}", e);
        }
    }

    /// 在 `duration` 内按 tick 发送保活并派发设备事件
    pub fn pump(&mut self, duration: Duration) {
        let deadline = self.clock.now() + duration;
        let tick = self.config.pump_tick();
        loop {
            self.ping();
            if let Err(e) = self.device.dispatch_events() {
                trace!("Event dispatch failed: {}", e);
            }
            let now = self.clock.now();
            if now >= deadline {
                break;
            }
            self.clock.sleep(tick.min(deadline - now));
        }
    }

    /// 以毫秒为单位的 `pump`
    pub fn pump_ms(&mut self, millis: u64) {
        self.pump(ms(millis));
    }

    /// 唤醒通道（不半按）
    ///
    /// ping → 用当前值重写取景输出设备 → 读取 Tv/Av/ISO，每步之间短暂保活。
    pub fn wake(&mut self) {
        self.ping();
        self.pump_ms(self.config.wake_ping_ms);
        match self.device.get_property(PropertyId::EvfOutputDevice) {
            Ok(current) => {
                self.set_best_effort(PropertyId::EvfOutputDevice, current);
            },
            Err(e) => trace!("Wake: cannot read EVF output: {}", e),
        }
        self.pump_ms(self.config.wake_touch_ms);
        self.touch_exposure();
        self.pump_ms(self.config.wake_touch_ms);
    }

    /// 读取一遍 Tv/Av/ISO（结果丢弃）
    pub fn touch_exposure(&mut self) {
        for property in PropertyId::EXPOSURE_TOUCH {
            if let Err(e) = self.device.get_property(property) {
                trace!("Touch {} failed: {}", property, e);
            }
        }
    }

    // ==================== 属性读写 ====================

    pub fn read(&mut self, property: PropertyId) -> Result<PropertyCode, DeviceError> {
        self.device.get_property(property)
    }

    /// 查询取值集合；设备不提供描述或查询失败时返回空集合
    pub fn describe(&mut self, property: PropertyId) -> PropertyValueSet {
        match self.device.describe_property(property) {
            Ok(values) => values,
            Err(e) => {
                debug!("No description for {}: {}", property, e);
                PropertyValueSet::empty()
            },
        }
    }

    /// 直接写入，不校验
    pub fn set(&mut self, property: PropertyId, code: PropertyCode) -> Result<(), DeviceError> {
        self.device.set_property(property, code)
    }

    /// 尽力写入：失败只记录日志
    pub fn set_best_effort(&mut self, property: PropertyId, code: PropertyCode) -> bool {
        match self.device.set_property(property, code) {
            Ok(()) => true,
            Err(e) => {
                debug!("Set {}={} failed (ignored): {}", property, code, e);
                false
            },
        }
    }

    /// 带 busy 重试的写入（默认策略，不校验）
    pub fn set_with_retry(
        &mut self,
        property: PropertyId,
        code: PropertyCode,
    ) -> Result<(), DriverError> {
        let policy = self.config.default_retry;
        self.with_busy_retry(policy, |cam, _| cam.set(property, code), |_, _| {})
            .map_err(|e| e.into_driver(property.name()))
    }

    /// 统一的 busy 重试组合子
    ///
    /// 每次 busy 失败后先通过保活泵等待退避时长，再调用 `on_busy` 做额外唤醒。
    pub fn with_busy_retry<T>(
        &mut self,
        policy: RetryPolicy,
        op: impl FnMut(&mut Self, u32) -> Result<T, DeviceError>,
        mut on_busy: impl FnMut(&mut Self, u32),
    ) -> Result<T, RetryError> {
        let classifier = Arc::clone(&self.classifier);
        retry_busy(self, &policy, classifier.as_ref(), op, |cam, attempt, delay| {
            cam.pump(delay);
            on_busy(cam, attempt);
        })
    }

    // ==================== 命令 ====================

    pub fn send(&mut self, command: DeviceCommand) -> Result<(), DeviceError> {
        self.device.send_command(command)
    }

    /// 松开快门（失败只记录日志）
    pub fn release_shutter(&mut self) -> Result<(), DeviceError> {
        let result = self.device.send_command(DeviceCommand::RELEASE);
        if let Err(e) = &result {
            warn!("Shutter release failed: {}", e);
        }
        result
    }

    pub fn ui_lock(&mut self) {
        if let Err(e) = self.device.send_command(DeviceCommand::UiLock) {
            debug!("UILock failed (ignored): {}", e);
        }
    }

    pub fn ui_unlock(&mut self) {
        if let Err(e) = self.device.send_command(DeviceCommand::UiUnlock) {
            debug!("UIUnLock failed (ignored): {}", e);
        }
    }

    /// 在 UI 锁内执行 `f`；无论 `f` 结果如何都解锁
    pub fn with_ui_lock<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.ui_lock();
        let result = f(self);
        self.ui_unlock();
        result
    }

    // ==================== 实时取景与存储 ====================

    /// 打开实时取景并输出到主机
    pub fn enable_evf(&mut self) {
        self.set_best_effort(PropertyId::EvfMode, 1);
        self.pump_ms(self.config.evf_mode_settle_ms);
        self.set_best_effort(PropertyId::EvfOutputDevice, EvfOutput::Pc.into());
        self.pump_ms(self.config.evf_output_settle_ms);
        info!("EVF mode -> ON, output -> PC");
    }

    /// 重置实时取景（变焦斜坡停滞时的恢复序列）
    ///
    /// 松开快门、唤醒、取景输出关→开，再触碰曝光属性。所有错误忽略。
    pub fn reset_liveview(&mut self) {
        info!("Resetting live view");
        let _ = self.release_shutter();
        self.wake();
        self.pump_ms(self.config.lv_reset_wake_ms);
        self.set_best_effort(PropertyId::EvfMode, 1);
        self.pump_ms(self.config.evf_mode_settle_ms);
        self.set_best_effort(PropertyId::EvfOutputDevice, EvfOutput::Off.into());
        self.pump_ms(self.config.lv_output_off_ms);
        self.set_best_effort(PropertyId::EvfOutputDevice, EvfOutput::Pc.into());
        self.pump_ms(self.config.lv_output_on_ms);
        self.touch_exposure();
        self.pump_ms(self.config.lv_reset_settle_ms);
    }

    /// 保存到主机并声明最大容量
    pub fn prepare_host_storage(&mut self) -> Result<(), DriverError> {
        self.set_with_retry(PropertyId::SaveTo, SaveTarget::Host.into())?;
        let policy = self.config.default_retry;
        self.with_busy_retry(
            policy,
            |cam, _| cam.device.set_capacity(HostCapacity::maximal()),
            |_, _| {},
        )
        .map_err(|e| e.into_driver("SetCapacity"))?;
        info!("SaveTo -> Host, capacity announced");
        Ok(())
    }

    /// 关闭会话
    pub fn close(&mut self) -> Result<(), DeviceError> {
        self.device.close_session()
    }
}

/// Camera 构建器
#[derive(Default)]
pub struct CameraBuilder {
    config: Option<DriverConfig>,
    clock: Option<Arc<dyn Clock>>,
    classifier: Option<Arc<dyn BusyClassifier>>,
}

impl CameraBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: DriverConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// 替换 busy 分类器（默认使用 `MarkerClassifier` + 配置中的额外标记）
    pub fn classifier(mut self, classifier: Arc<dyn BusyClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn build<D: DeviceChannel>(self, device: D) -> Camera<D> {
        let config = self.config.unwrap_or_default();
        let classifier = self.classifier.unwrap_or_else(|| {
            Arc::new(MarkerClassifier::with_extra_markers(
                &config.extra_busy_markers,
            ))
        });
        Camera {
            device,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock::new())),
            classifier,
            config,
            keepalive_failures: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::mock_camera;
    use mda_device::mock::{CommandBehavior, MockDevice, MockEvent, SetBehavior};

    fn pings(device: &MockDevice) -> usize {
        device
            .commands()
            .iter()
            .filter(|c| **c == DeviceCommand::ExtendShutDownTimer)
            .count()
    }

    #[test]
    fn test_pump_ticks_and_pings() {
        let (mut camera, device, clock) = mock_camera();
        camera.pump(Duration::from_millis(175));
        assert_eq!(clock.elapsed(), Duration::from_millis(175));
        // 0, 50, 100, 150, 175
        assert_eq!(pings(&device), 5);
    }

    #[test]
    fn test_builder_applies_config_and_clock() {
        let device = MockDevice::new();
        let clock = crate::ManualClock::new();
        let config = DriverConfig {
            pump_tick_ms: 100,
            ..DriverConfig::default()
        };
        let mut camera = CameraBuilder::new()
            .config(config)
            .clock(Arc::new(clock.clone()))
            .build(device.clone());

        assert_eq!(camera.config().pump_tick_ms, 100);
        camera.pump(Duration::from_millis(200));
        assert_eq!(clock.elapsed(), Duration::from_millis(200));
        // 0, 100, 200
        assert_eq!(pings(&device), 3);
    }

    #[test]
    fn test_pump_zero_still_services_events() {
        let (mut camera, device, clock) = mock_camera();
        camera.pump(Duration::ZERO);
        assert_eq!(clock.elapsed(), Duration::ZERO);
        assert_eq!(pings(&device), 1);
    }

    #[test]
    fn test_pump_survives_failing_keepalive() {
        let (mut camera, device, _clock) = mock_camera();
        device.script_commands(
            DeviceCommand::ExtendShutDownTimer,
            [CommandBehavior::Busy, CommandBehavior::Busy],
        );
        camera.pump(Duration::from_millis(100));
        assert_eq!(camera.keepalive_failures(), 2);
    }

    #[test]
    fn test_wake_retouches_output_device() {
        let (mut camera, device, _clock) = mock_camera();
        camera.wake();
        assert!(
            device
                .events()
                .iter()
                .any(|e| e.is_accepted_set(PropertyId::EvfOutputDevice, 1))
        );
        for property in PropertyId::EXPOSURE_TOUCH {
            assert!(device.events().contains(&MockEvent::Get(property)));
        }
    }

    #[test]
    fn test_enable_evf() {
        let (mut camera, device, _clock) = mock_camera();
        camera.enable_evf();
        assert_eq!(device.value(PropertyId::EvfMode), Some(1));
        assert_eq!(device.value(PropertyId::EvfOutputDevice), Some(2));
    }

    #[test]
    fn test_reset_liveview_toggles_output() {
        let (mut camera, device, _clock) = mock_camera();
        camera.reset_liveview();
        let outputs = device.set_calls(PropertyId::EvfOutputDevice);
        // 唤醒时重写当前值 1，然后 0 → 2
        assert_eq!(outputs, vec![1, 0, 2]);
        assert_eq!(device.commands()[0], DeviceCommand::RELEASE);
    }

    #[test]
    fn test_with_ui_lock_always_unlocks() {
        let (mut camera, device, _clock) = mock_camera();
        let result: Result<(), DeviceError> =
            camera.with_ui_lock(|_| Err(DeviceError::from("boom")));
        assert!(result.is_err());
        let commands = device.commands();
        assert_eq!(commands.first(), Some(&DeviceCommand::UiLock));
        assert_eq!(commands.last(), Some(&DeviceCommand::UiUnlock));
    }

    #[test]
    fn test_set_with_retry_absorbs_busy() {
        let (mut camera, device, clock) = mock_camera();
        device.script_sets(PropertyId::SaveTo, [SetBehavior::Busy, SetBehavior::Busy]);
        camera.set_with_retry(PropertyId::SaveTo, 2).unwrap();
        assert_eq!(device.value(PropertyId::SaveTo), Some(2));
        // 两次退避：0.3 s + 0.5 s
        assert_eq!(clock.elapsed(), Duration::from_millis(800));
    }

    #[test]
    fn test_prepare_host_storage() {
        let (mut camera, device, _clock) = mock_camera();
        camera.prepare_host_storage().unwrap();
        assert_eq!(device.value(PropertyId::SaveTo), Some(2));
        assert!(
            device
                .events()
                .contains(&MockEvent::Capacity(HostCapacity::maximal()))
        );
    }

    #[test]
    fn test_describe_missing_is_empty() {
        let (mut camera, _device, _clock) = mock_camera();
        assert!(camera.describe(PropertyId::AfMode).is_empty());
        assert_eq!(camera.describe(PropertyId::Zoom).as_slice(), &[201]);
    }
}
