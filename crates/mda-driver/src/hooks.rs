//! 资产保存回调（Asset Collector）
//!
//! 设备在事件派发上下文中回调 [`AssetCollector`]：下载文件到捕获目录，
//! 再通过有界通道把路径交给编排线程。
//!
//! # 设计
//!
//! - **Bounded Queue**: `bounded(256)`，队列满时丢弃路径并计数，不阻塞回调
//! - **命名**: 当前类别由编排线程通过 `set_category` 更新（`RwLock`）
//! - **监控**: 交付 / 丢弃 / 下载失败三个计数器
//!
//! ```rust
//! use mda_driver::hooks::AssetCollector;
//! use mda_device::AssetEventHandler;
//! use std::sync::Arc;
//!
//! let (collector, assets) = AssetCollector::new("/tmp/capture", "MDA12345");
//! let collector = Arc::new(collector);
//! collector.set_category("Left Side");
//! let handler = collector.clone() as Arc<dyn AssetEventHandler>;
//! // device.set_asset_handler(handler)?;
//! // ... camera.pump(...) ...
//! let saved = assets.drain();
//! # let _ = (handler, saved);
//! ```

use crate::assets::{asset_file_name, unique_path};
use chrono::Local;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use mda_device::{AssetEvent, AssetEventHandler, DirectoryItem};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, trace, warn};

/// 资产保存回调
pub struct AssetCollector {
    capture_dir: PathBuf,
    project_id: String,
    category: RwLock<String>,
    tx: Sender<PathBuf>,
    delivered: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl AssetCollector {
    /// 默认队列容量
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(
        capture_dir: impl Into<PathBuf>,
        project_id: impl Into<String>,
    ) -> (Self, AssetReceiver) {
        Self::with_capacity(capture_dir, project_id, Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(
        capture_dir: impl Into<PathBuf>,
        project_id: impl Into<String>,
        capacity: usize,
    ) -> (Self, AssetReceiver) {
        let (tx, rx) = bounded(capacity.max(1));
        let collector = Self {
            capture_dir: capture_dir.into(),
            project_id: project_id.into(),
            category: RwLock::new(String::new()),
            tx,
            delivered: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
        };
        (collector, AssetReceiver { rx })
    }

    pub fn capture_dir(&self) -> &Path {
        &self.capture_dir
    }

    /// 更新当前类别（决定后续资产的文件名）
    pub fn set_category(&self, category: &str) {
        *self.category.write() = category.to_string();
    }

    pub fn category(&self) -> String {
        self.category.read().clone()
    }

    pub fn delivered(&self) -> &Arc<AtomicU64> {
        &self.delivered
    }

    /// 队列满而丢弃的路径数（文件已落盘）
    pub fn dropped(&self) -> &Arc<AtomicU64> {
        &self.dropped
    }

    /// 下载失败次数
    pub fn failed(&self) -> &Arc<AtomicU64> {
        &self.failed
    }
}

impl AssetEventHandler for AssetCollector {
    fn on_asset_event(&self, event: AssetEvent, item: &mut dyn DirectoryItem) {
        if !event.is_transfer() {
            trace!("Ignoring asset event {:?}", event);
            return;
        }
        let name = asset_file_name(&self.project_id, &self.category.read(), &Local::now());
        let path = unique_path(&self.capture_dir, &name);
        match item.download_to(&path) {
            Ok(bytes) => {
                info!("Saved {} ({} bytes, from {})", path.display(), bytes, item.file_name());
                match self.tx.try_send(path) {
                    Ok(()) => {
                        self.delivered.fetch_add(1, Ordering::Relaxed);
                    },
                    Err(TrySendError::Full(path)) | Err(TrySendError::Disconnected(path)) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!("Asset queue unavailable, dropped {}", path.display());
                    },
                }
            },
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!("Download of {} failed: {}", item.file_name(), e);
            },
        }
    }
}

/// 编排线程一侧的接收端
pub struct AssetReceiver {
    rx: Receiver<PathBuf>,
}

impl AssetReceiver {
    /// 取出目前已交付的全部路径（不阻塞）
    pub fn drain(&self) -> Vec<PathBuf> {
        self.rx.try_iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
