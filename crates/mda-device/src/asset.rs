//! 资产（拍摄产出的图像文件）事件
//!
//! 设备在拍摄后通过回调通知资产就绪；回调运行在设备通道的事件派发上下文中
//! （即 `DeviceChannel::dispatch_events` 内部），处理器必须是 `Send + Sync`。

use crate::DeviceError;
use std::path::Path;

/// 资产事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetEvent {
    /// 设备请求主机接收文件
    DirItemRequestTransfer,
    /// 设备上新建了文件
    DirItemCreated,
    /// 其他事件（原始码）
    Other(u32),
}

impl AssetEvent {
    /// 是否需要下载
    pub fn is_transfer(&self) -> bool {
        matches!(
            self,
            AssetEvent::DirItemRequestTransfer | AssetEvent::DirItemCreated
        )
    }
}

/// 设备上的一个目录项
pub trait DirectoryItem {
    /// 设备端文件名
    fn file_name(&self) -> &str;

    /// 文件大小（字节）
    fn size(&self) -> u64;

    /// 下载到本地路径，并通知设备传输完成
    fn download_to(&mut self, path: &Path) -> Result<u64, DeviceError>;
}

/// 资产事件处理器
///
/// # 线程安全
///
/// 回调在设备的事件派发上下文中执行；与编排线程之间的交接必须是并发安全的。
pub trait AssetEventHandler: Send + Sync {
    fn on_asset_event(&self, event: AssetEvent, item: &mut dyn DirectoryItem);
}
