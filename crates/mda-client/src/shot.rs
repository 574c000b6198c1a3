//! # 拍摄流水线
//!
//! 每张拍摄的固定顺序：
//!
//! 1. 记录当前类别（资产命名）
//! 2. 快照捕获目录（回退扫描基线）
//! 3. 快门速度
//! 4. 有变焦目标时执行斜坡，否则读取当前位置
//! 5. 光圈
//! 6. ISO
//! 7. 非 AF 全按拍摄（前后保活，busy 重试，必定松开）
//! 8. 拍摄后等待
//! 9. 收集资产：只取全按之后交付的路径；回调通道优先，没有时比较目录快照，
//!    通道溢出时用目录快照补齐
//! 10. 读取曝光补偿
//! 11. 每个资产交给接收端一次
//!
//! 单个属性失败只降级（记录日志并使用设备当前值），只有连接级错误中止。

use crate::error::{CaptureError, Result};
use crate::exposure::{apply_aperture, apply_iso, apply_shutter, read_exposure_compensation};
use crate::sink::ShotSink;
use crate::state::SessionState;
use crate::zoom::ZoomRamp;
use chrono::{DateTime, Local};
use mda_device::{AssetEventHandler, DeviceChannel};
use mda_driver::assets::{new_images_since, snapshot_images};
use mda_driver::{AssetCollector, AssetReceiver, Camera, RetryError};
use mda_protocol::exposure::tv_log_text;
use mda_protocol::{PropertyCode, PropertyId};
use mda_tools::ShotRecord;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

/// 一张拍摄的请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShotRequest {
    pub category: String,
    pub tv_label: String,
    pub av_label: String,
    pub iso_label: String,
    /// 变焦目标（`None` = 保持当前位置）
    pub zoom_target: Option<PropertyCode>,
    pub is_reference: bool,
}

impl ShotRequest {
    pub fn new(
        category: impl Into<String>,
        tv_label: impl Into<String>,
        av_label: impl Into<String>,
        iso_label: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            tv_label: tv_label.into(),
            av_label: av_label.into(),
            iso_label: iso_label.into(),
            zoom_target: None,
            is_reference: false,
        }
    }

    pub fn with_zoom(mut self, target: PropertyCode) -> Self {
        self.zoom_target = Some(target);
        self
    }

    pub fn reference(mut self) -> Self {
        self.is_reference = true;
        self
    }
}

/// 一张拍摄的结果
#[derive(Debug, Clone, PartialEq)]
pub struct ShotResult {
    pub category: String,
    /// 快门速度标签（回读值）
    pub tv_label: String,
    pub av_label: String,
    pub iso_label: String,
    pub zoom: Option<PropertyCode>,
    /// 曝光补偿（EV）
    pub ec: Option<f64>,
    /// 产出的资产（可能为空）
    pub assets: Vec<PathBuf>,
    /// 资产来源：`true` = 目录比较回退
    pub from_fallback: bool,
    /// 快门是否成功按下
    pub captured: bool,
    /// 变焦斜坡失败原因
    pub ramp_error: Option<String>,
    pub timestamp: DateTime<Local>,
}

impl ShotResult {
    /// 一个资产对应的日志记录
    pub fn record_for(&self, asset: &Path, order: Option<usize>) -> ShotRecord {
        ShotRecord {
            order,
            timestamp: self.timestamp,
            feature: self.category.clone(),
            image: asset
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: asset.to_path_buf(),
            tv: tv_log_text(&self.tv_label),
            av: self.av_label.clone(),
            zoom: self.zoom,
            iso: self.iso_label.clone(),
            ec: self.ec,
        }
    }
}

/// 资产回调与编排线程之间的交接
pub struct AssetHandoff {
    collector: Arc<AssetCollector>,
    receiver: AssetReceiver,
}

impl AssetHandoff {
    pub fn new(capture_dir: impl Into<PathBuf>, project_id: impl Into<String>) -> Self {
        let (collector, receiver) = AssetCollector::new(capture_dir, project_id);
        Self {
            collector: Arc::new(collector),
            receiver,
        }
    }

    /// 指定通道容量
    pub fn with_capacity(
        capture_dir: impl Into<PathBuf>,
        project_id: impl Into<String>,
        capacity: usize,
    ) -> Self {
        let (collector, receiver) = AssetCollector::with_capacity(capture_dir, project_id, capacity);
        Self {
            collector: Arc::new(collector),
            receiver,
        }
    }

    pub fn collector(&self) -> &Arc<AssetCollector> {
        &self.collector
    }

    /// 安装到设备上的回调
    pub fn handler(&self) -> Arc<dyn AssetEventHandler> {
        self.collector.clone()
    }

    pub fn capture_dir(&self) -> &Path {
        self.collector.capture_dir()
    }

    fn snapshot(&self) -> HashSet<PathBuf> {
        match snapshot_images(self.capture_dir()) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Cannot snapshot {}: {}", self.capture_dir().display(), e);
                HashSet::new()
            },
        }
    }

    fn dropped(&self) -> u64 {
        self.collector.dropped().load(Ordering::Relaxed)
    }

    /// 回调交付的资产；没有时回退到目录比较
    ///
    /// `dropped_before` 之后通道有丢弃时，目录中新增而未交付的文件追加在回调结果之后。
    fn collect(&self, baseline: &HashSet<PathBuf>, dropped_before: u64) -> (Vec<PathBuf>, bool) {
        let mut delivered = self.receiver.drain();
        if !delivered.is_empty() {
            let dropped = self.dropped().saturating_sub(dropped_before);
            if dropped > 0 {
                warn!("Asset queue dropped {} path(s); recovering from directory", dropped);
                match new_images_since(self.capture_dir(), baseline) {
                    Ok(fresh) => {
                        for path in fresh {
                            if !delivered.contains(&path) {
                                delivered.push(path);
                            }
                        }
                    },
                    Err(e) => {
                        warn!("Recovery scan of {} failed: {}", self.capture_dir().display(), e)
                    },
                }
            }
            return (delivered, false);
        }
        match new_images_since(self.capture_dir(), baseline) {
            Ok(fresh) if !fresh.is_empty() => {
                info!("Fallback picked up {} file(s)", fresh.len());
                (fresh, true)
            },
            Ok(_) => (Vec::new(), false),
            Err(e) => {
                warn!("Fallback scan of {} failed: {}", self.capture_dir().display(), e);
                (Vec::new(), false)
            },
        }
    }
}

/// 拍摄流水线（借用会话的相机、状态和资产交接）
pub struct ShotPipeline<'a, D: DeviceChannel> {
    camera: &'a mut Camera<D>,
    state: &'a mut SessionState,
    assets: &'a AssetHandoff,
}

impl<'a, D: DeviceChannel> ShotPipeline<'a, D> {
    pub fn new(
        camera: &'a mut Camera<D>,
        state: &'a mut SessionState,
        assets: &'a AssetHandoff,
    ) -> Self {
        Self {
            camera,
            state,
            assets,
        }
    }

    /// 执行一张拍摄，并把每个资产交给 `sink`
    ///
    /// 自动对焦未关闭时拒绝拍摄。
    pub fn take_shot(
        &mut self,
        request: &ShotRequest,
        sink: &mut dyn ShotSink,
        order: Option<usize>,
    ) -> Result<ShotResult> {
        if !self.state.af_disabled {
            return Err(CaptureError::AutofocusActive);
        }

        // 1. 类别
        self.state.category = request.category.clone();
        self.assets.collector().set_category(&request.category);
        let stale = self.assets.receiver.drain();
        if !stale.is_empty() {
            debug!("Discarding {} late asset(s) from the previous shot", stale.len());
        }

        // 2. 回退基线
        let mut baseline = self.assets.snapshot();

        // 3. 快门速度
        let tv = apply_shutter(self.camera, &request.tv_label)?;

        // 4. 变焦
        let mut ramp_error = None;
        if let Some(target) = request.zoom_target {
            let report = ZoomRamp::new(target).run(self.camera, self.state);
            if let Some(e) = report.error {
                if e.is_fatal() {
                    return Err(e);
                }
                warn!("Zoom ramp FAILED: {}", e);
                ramp_error = Some(e.to_string());
            }
        }
        let zoom = self.read_zoom()?;
        match request.zoom_target {
            Some(_) => info!("Zoom readback: {:?}", zoom),
            None => info!("Zoom unchanged at: {:?}", zoom),
        }

        // 5-6. 光圈、ISO
        let av = apply_aperture(self.camera, &request.av_label)?;
        let iso = apply_iso(self.camera, &request.iso_label)?;

        // 7. 拍摄
        self.camera.pump_ms(self.camera.config().pre_capture_ms);

        // 之前的拍摄在设置属性期间才到达的资产不属于这一张
        let late = self.assets.receiver.drain();
        if !late.is_empty() {
            warn!(
                "Discarding {} asset(s) delivered before the '{}' capture",
                late.len(),
                request.category
            );
            baseline.extend(late);
        }
        let dropped_before = self.assets.dropped();

        if request.is_reference {
            info!("Reference capture (NON-AF)");
        } else {
            info!("Capture (NON-AF)");
        }
        let captured = match self.camera.capture_non_af() {
            Ok(()) => true,
            Err(RetryError::Fatal(e)) if e.is_fatal() => return Err(CaptureError::Device(e)),
            Err(_) => false,
        };
        self.state.shots_taken += 1;

        // 8. 等待资产落盘
        self.camera.pump_ms(self.camera.config().post_shot_wait_ms);

        // 9. 收集资产
        let (assets, from_fallback) = self.assets.collect(&baseline, dropped_before);

        // 10. 曝光补偿
        let ec = read_exposure_compensation(self.camera);

        let result = ShotResult {
            category: request.category.clone(),
            tv_label: tv.label,
            av_label: av.label,
            iso_label: iso.label,
            zoom,
            ec,
            assets,
            from_fallback,
            captured,
            ramp_error,
            timestamp: Local::now(),
        };

        // 11. 交给接收端
        if result.assets.is_empty() {
            warn!("No files detected to log for '{}'", request.category);
        }
        for asset in &result.assets {
            sink.record(&result, asset, order)?;
        }
        if !result.assets.is_empty() {
            info!(
                "Logged {} shot(s) for '{}'",
                result.assets.len(),
                request.category
            );
        }
        Ok(result)
    }

    fn read_zoom(&mut self) -> Result<Option<PropertyCode>> {
        match self.camera.read(PropertyId::Zoom) {
            Ok(position) => {
                self.state.zoom = Some(position);
                Ok(Some(position))
            },
            Err(e) if e.is_fatal() => Err(CaptureError::Device(e)),
            Err(e) => {
                debug!("Zoom read failed: {}", e);
                Ok(None)
            },
        }
    }
}
