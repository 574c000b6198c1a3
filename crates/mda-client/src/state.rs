//! 会话状态
//!
//! 一个相机连接对应一个 [`SessionState`]，显式传入各组件而不是全局变量。

use mda_protocol::PropertyCode;

/// 对焦生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FocusState {
    #[default]
    Unknown,
    Acquiring,
    Acquired,
    AcquireFailed,
}

/// 会话级可变状态
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// 最近一次观察到的变焦位置（仅缓存，使用前必须从设备重新读取）
    pub zoom: Option<PropertyCode>,
    /// 当前类别（决定资产文件名）
    pub category: String,
    pub focus: FocusState,
    /// 自动对焦已关闭（会话内单向）
    pub af_disabled: bool,
    /// 资产回调已安装
    pub handler_installed: bool,
    /// 已完成的对焦获取次数
    pub focus_acquisitions: u32,
    /// 已发出的拍摄数
    pub shots_taken: u32,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }
}
