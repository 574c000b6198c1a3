//! # 捕获会话（Type State Pattern）
//!
//! 使用零大小类型（ZST）标记会话所处阶段，在编译期保证固定的宏观顺序：
//!
//! ```text
//! connect() → Connected
//!     prepare()     → LiveView      （AF 复位、主机存储、实时取景）
//!     lock_focus()  → FocusLocked   （唤醒对焦 → 第一级斜坡 → 确认对焦 → 关闭 AF → 安装回调）
//!     run_plan() / take_shot()      （只有 FocusLocked 才能拍摄）
//!     finish()                      （松开快门、关闭会话）
//! ```
//!
//! 任何阶段的会话被丢弃（包括中途返回错误）时，`Drop` 都会松开快门并关闭会话。

use crate::error::{CaptureError, Result};
use crate::focus::{acquire, disable_af, reset_af};
use crate::gate::{GateDecision, ShotGate};
use crate::plan::ShotPlan;
use crate::shot::{AssetHandoff, ShotPipeline, ShotRequest, ShotResult};
use crate::sink::ShotSink;
use crate::state::SessionState;
use crate::zoom::ZoomRamp;
use mda_device::{CameraBackend, DeviceChannel};
use mda_driver::config::ms;
use mda_driver::{Camera, CameraBuilder, Clock, DriverConfig};
use mda_protocol::PropertyCode;
use mda_tools::{ResolvedConfig, ZoomGroup};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

// ==================== 状态类型 ====================

/// 会话已打开，尚未准备
#[derive(Debug, Clone, Copy)]
pub struct Connected;

/// 实时取景已开启，AF 仍可用
#[derive(Debug, Clone, Copy)]
pub struct LiveView;

/// 对焦已冻结，可以拍摄
#[derive(Debug, Clone, Copy)]
pub struct FocusLocked;

// ==================== 会话选项 ====================

/// 会话阶段之间的等待（毫秒）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTiming {
    /// 打开会话后的稳定等待
    pub open_settle_ms: u64,
    /// AF 复位后的等待
    pub af_reset_settle_ms: u64,
    /// 唤醒对焦后、斜坡前的等待
    pub wake_release_ms: u64,
    /// 第一级斜坡后的静置等待
    pub first_ramp_quiet_ms: u64,
    /// 镜头稳定等待（确认对焦前）
    pub lens_settle_ms: u64,
    /// 在目标级别确认对焦的半按等待
    pub confirm_focus_wait_ms: u64,
    /// 确认对焦后的等待
    pub confirm_release_ms: u64,
    /// 操作员放行后、拍摄前的等待
    pub operator_delay_ms: u64,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            open_settle_ms: 1000,
            af_reset_settle_ms: 600,
            wake_release_ms: 400,
            first_ramp_quiet_ms: 800,
            lens_settle_ms: 1200,
            confirm_focus_wait_ms: 1800,
            confirm_release_ms: 300,
            operator_delay_ms: 0,
        }
    }
}

/// 会话选项
#[derive(Clone)]
pub struct SessionOptions {
    pub driver: DriverConfig,
    pub timing: SessionTiming,
    /// 资产保存目录
    pub capture_dir: PathBuf,
    /// 资产文件名前缀
    pub project_id: String,
    /// 后端中的相机序号
    pub camera_index: usize,
    /// 注入时钟（测试和模拟模式）；`None` 使用系统时钟
    pub clock: Option<Arc<dyn Clock>>,
}

impl std::fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOptions")
            .field("driver", &self.driver)
            .field("timing", &self.timing)
            .field("capture_dir", &self.capture_dir)
            .field("project_id", &self.project_id)
            .field("camera_index", &self.camera_index)
            .field("clock", &self.clock.as_ref().map(|_| "custom"))
            .finish()
    }
}

impl SessionOptions {
    pub fn new(capture_dir: impl Into<PathBuf>, project_id: impl Into<String>) -> Self {
        Self {
            driver: DriverConfig::default(),
            timing: SessionTiming::default(),
            capture_dir: capture_dir.into(),
            project_id: project_id.into(),
            camera_index: 0,
            clock: None,
        }
    }

    /// 从解析后的配置取项目号、拍摄后等待和操作员延迟
    pub fn from_config(config: &ResolvedConfig, capture_dir: impl Into<PathBuf>) -> Self {
        Self::new(capture_dir, config.project_id.clone()).with_config_waits(config)
    }

    /// 用配置中的拍摄后等待和操作员延迟覆盖时序
    ///
    /// 在 [`driver`](Self::driver) / [`timing`](Self::timing) 之后调用。
    pub fn with_config_waits(mut self, config: &ResolvedConfig) -> Self {
        self.driver.post_shot_wait_ms = duration_ms(config.post_shot_wait);
        self.timing.operator_delay_ms = duration_ms(config.operator_delay);
        self
    }

    pub fn driver(mut self, driver: DriverConfig) -> Self {
        self.driver = driver;
        self
    }

    pub fn timing(mut self, timing: SessionTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn camera_index(mut self, index: usize) -> Self {
        self.camera_index = index;
        self
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ==================== 运行汇总 ====================

/// 一次运行的汇总
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// 尝试的拍摄数
    pub shots_attempted: usize,
    /// 快门成功按下的拍摄数
    pub shots_captured: usize,
    /// 记录的资产数
    pub assets_logged: usize,
    /// 资产来自目录回退扫描的拍摄数
    pub fallback_shots: usize,
    /// 变焦斜坡失败（拍摄照常进行）
    pub ramp_failures: Vec<String>,
    /// 失败的拍摄：(类别, 原因)
    pub failed: Vec<(String, String)>,
    /// 操作员中止时的类别
    pub aborted_before: Option<String>,
}

impl RunSummary {
    fn record(&mut self, result: &ShotResult) {
        self.shots_attempted += 1;
        if result.captured {
            self.shots_captured += 1;
        }
        self.assets_logged += result.assets.len();
        if result.from_fallback {
            self.fallback_shots += 1;
        }
        if let Some(reason) = &result.ramp_error {
            self.ramp_failures
                .push(format!("{}: {}", result.category, reason));
        }
    }

    /// 所有拍摄都成功且没有中止
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.aborted_before.is_none() && self.ramp_failures.is_empty()
    }
}

// ==================== 会话 ====================

struct SessionInner<D: DeviceChannel> {
    camera: Camera<D>,
    state: SessionState,
    assets: AssetHandoff,
    timing: SessionTiming,
    summary: RunSummary,
    closed: bool,
}

impl<D: DeviceChannel> SessionInner<D> {
    /// 松开快门并关闭会话（只执行一次）
    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        info!("Cleanup: releasing shutter and closing session");
        if let Err(e) = self.camera.release_shutter() {
            warn!("Cleanup release failed: {}", e);
        }
        match self.camera.close() {
            Ok(()) => info!("Session closed"),
            Err(e) => warn!("Close session failed: {}", e),
        }
    }
}

/// 捕获会话
///
/// `S` 是阶段标记；只有 [`FocusLocked`] 阶段提供拍摄方法。
pub struct CaptureSession<D: DeviceChannel, S = Connected> {
    inner: SessionInner<D>,
    _state: S,
}

impl<D: DeviceChannel, S> CaptureSession<D, S> {
    /// 会话状态
    pub fn state(&self) -> &SessionState {
        &self.inner.state
    }

    pub fn camera(&self) -> &Camera<D> {
        &self.inner.camera
    }

    /// 到目前为止的运行汇总
    pub fn summary(&self) -> &RunSummary {
        &self.inner.summary
    }

    /// 切换阶段（不触发 Drop）
    fn transition<T>(self, state: T) -> CaptureSession<D, T> {
        // Use ManuallyDrop to prevent Drop, then move the inner session out
        let this = std::mem::ManuallyDrop::new(self);

        // SAFETY: `this.inner` is valid and is read exactly once here.
        // The original `self` is never dropped (ManuallyDrop guarantees this),
        // so ownership of `inner` moves into the returned session without a
        // second cleanup.
        let inner = unsafe { std::ptr::read(&this.inner) };

        CaptureSession {
            inner,
            _state: state,
        }
    }
}

impl<D: DeviceChannel> CaptureSession<D, Connected> {
    /// 连接第 `camera_index` 台相机
    ///
    /// # 错误
    ///
    /// - [`CaptureError::NoCamera`]：后端没有相机
    /// - [`CaptureError::SessionOpen`]：打开会话失败
    pub fn connect<B>(backend: &mut B, options: SessionOptions) -> Result<Self>
    where
        B: CameraBackend<Channel = D>,
    {
        let count = backend.camera_count().map_err(CaptureError::SessionOpen)?;
        if count == 0 {
            error!("No camera detected");
            return Err(CaptureError::NoCamera);
        }
        let device = backend
            .open_session(options.camera_index)
            .map_err(CaptureError::SessionOpen)?;
        info!("Session opened (camera {} of {})", options.camera_index + 1, count);

        let mut builder = CameraBuilder::new().config(options.driver);
        if let Some(clock) = options.clock {
            builder = builder.clock(clock);
        }
        let mut camera = builder.build(device);
        camera.pump_ms(options.timing.open_settle_ms);

        Ok(Self {
            inner: SessionInner {
                camera,
                state: SessionState::new(),
                assets: AssetHandoff::new(options.capture_dir, options.project_id),
                timing: options.timing,
                summary: RunSummary::default(),
                closed: false,
            },
            _state: Connected,
        })
    }

    /// AF 复位 → 主机存储 → 实时取景
    pub fn prepare(mut self) -> Result<CaptureSession<D, LiveView>> {
        let inner = &mut self.inner;
        reset_af(&mut inner.camera, &mut inner.state);
        inner.camera.pump_ms(inner.timing.af_reset_settle_ms);

        match inner.camera.prepare_host_storage() {
            Ok(()) => {},
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => warn!("Host storage setup failed: {}", e),
        }
        inner.camera.enable_evf();
        info!("Live view enabled");

        Ok(self.transition(LiveView))
    }
}

impl<D: DeviceChannel> CaptureSession<D, LiveView> {
    /// 唤醒对焦 → 第一级斜坡 → 确认对焦 → 关闭 AF → 安装资产回调
    ///
    /// 斜坡失败只记录（对焦仍在当前位置确认）；连接级错误中止。
    pub fn lock_focus(mut self, first_level: PropertyCode) -> Result<CaptureSession<D, FocusLocked>> {
        let inner = &mut self.inner;
        let timing = inner.timing.clone();

        // 1. 唤醒对焦
        info!("Focus acquire (wake)");
        let wait = ms(inner.camera.config().half_press_wait_ms);
        acquire(&mut inner.camera, &mut inner.state, wait)?;
        inner.camera.pump_ms(timing.wake_release_ms);

        // 2. 第一级斜坡
        let report = ZoomRamp::new(first_level)
            .quiet_settle(ms(timing.first_ramp_quiet_ms))
            .run(&mut inner.camera, &mut inner.state);
        if let Some(e) = report.error {
            if e.is_fatal() {
                return Err(e);
            }
            warn!("Initial zoom ramp failed: {}; focusing at current position", e);
            inner.summary.ramp_failures.push(format!("initial: {e}"));
        }
        inner.camera.pump_ms(timing.lens_settle_ms);

        // 3. 在目标级别确认对焦
        info!("Focus acquire (confirm at level)");
        acquire(
            &mut inner.camera,
            &mut inner.state,
            ms(timing.confirm_focus_wait_ms),
        )?;
        inner.camera.pump_ms(timing.confirm_release_ms);

        // 4. 冻结
        disable_af(&mut inner.camera, &mut inner.state);

        // 5. 资产回调
        let handler = inner.assets.handler();
        match inner.camera.device_mut().set_asset_handler(handler) {
            Ok(()) => {
                inner.state.handler_installed = true;
                info!("Asset handler installed");
            },
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => warn!("Asset handler install failed ({}); relying on directory scan", e),
        }

        Ok(self.transition(FocusLocked))
    }
}

impl<D: DeviceChannel> CaptureSession<D, FocusLocked> {
    /// 执行一张拍摄
    pub fn take_shot(
        &mut self,
        request: &ShotRequest,
        sink: &mut dyn ShotSink,
        order: Option<usize>,
    ) -> Result<ShotResult> {
        let inner = &mut self.inner;
        let mut pipeline = ShotPipeline::new(&mut inner.camera, &mut inner.state, &inner.assets);
        let result = pipeline.take_shot(request, sink, order)?;
        inner.summary.record(&result);
        Ok(result)
    }

    /// 按计划执行全部拍摄
    ///
    /// 单张拍摄的非致命失败记录后继续；连接级错误和操作员中止返回 `Err`
    /// （已完成的部分仍可通过 [`CaptureSession::summary`] 查看）。
    pub fn run_plan<G>(
        &mut self,
        plan: &ShotPlan,
        sink: &mut dyn ShotSink,
        gate: &mut G,
    ) -> Result<RunSummary>
    where
        G: ShotGate + ?Sized,
    {
        let total = plan.len();
        let mut current_group: Option<ZoomGroup> = None;

        for (position, shot) in plan.iter().enumerate() {
            if current_group != Some(shot.group) {
                let count = plan.iter().filter(|s| s.group == shot.group).count();
                info!("==================== {} ({} shots) ====================", shot.group.name(), count);
                gate.on_group_start(shot.group, count);
                current_group = Some(shot.group);
            }

            let category = &shot.request.category;
            if gate.before_shot(shot, position, total) == GateDecision::Abort {
                warn!("Aborted by operator before '{}'", category);
                self.inner.summary.aborted_before = Some(category.clone());
                return Err(CaptureError::Aborted(category.clone()));
            }
            self.inner.camera.pump_ms(self.inner.timing.operator_delay_ms);

            info!("[{}/{}] {}", position + 1, total, category);
            match self.take_shot(&shot.request, sink, shot.order) {
                Ok(_) => {},
                Err(e) if e.is_fatal() => {
                    error!("Shot '{}' failed fatally: {}", category, e);
                    return Err(e);
                },
                Err(e) => {
                    warn!("Shot '{}' failed: {}", category, e);
                    self.inner.summary.shots_attempted += 1;
                    self.inner
                        .summary
                        .failed
                        .push((category.clone(), e.to_string()));
                },
            }
        }

        Ok(self.inner.summary.clone())
    }
}

impl<D: DeviceChannel, S> CaptureSession<D, S> {
    /// 松开快门、关闭会话，返回运行汇总
    pub fn finish(mut self) -> RunSummary {
        self.inner.shutdown();
        self.inner.summary.clone()
    }
}

impl<D: DeviceChannel, S> Drop for CaptureSession<D, S> {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

/// 完整运行：连接 → 准备 → 冻结对焦 → 按计划拍摄 → 清理 → 日志排序
///
/// 清理和日志排序在任何结果下都会执行（包括连接、准备和对焦阶段失败）。
pub fn run_capture<B, G>(
    backend: &mut B,
    options: SessionOptions,
    plan: &ShotPlan,
    sink: &mut dyn ShotSink,
    gate: &mut G,
) -> Result<RunSummary>
where
    B: CameraBackend,
    G: ShotGate + ?Sized,
{
    if !plan.starts_with_reference() {
        warn!("Plan does not start with the reference shot");
    }

    // 会话在返回前已关闭
    let outcome = run_session(backend, options, plan, sink, gate);

    if let Err(e) = sink.finish() {
        warn!("Shot log finalisation failed: {}", e);
    }
    let summary = outcome?;
    info!(
        "Capture complete: {} shot(s), {} asset(s) logged",
        summary.shots_attempted, summary.assets_logged
    );
    Ok(summary)
}

fn run_session<B, G>(
    backend: &mut B,
    options: SessionOptions,
    plan: &ShotPlan,
    sink: &mut dyn ShotSink,
    gate: &mut G,
) -> Result<RunSummary>
where
    B: CameraBackend,
    G: ShotGate + ?Sized,
{
    let mut session = CaptureSession::connect(backend, options)?
        .prepare()?
        .lock_focus(plan.first_level())?;
    let outcome = session.run_plan(plan, sink, gate);
    let summary = session.finish();
    outcome.map(|_| summary)
}
