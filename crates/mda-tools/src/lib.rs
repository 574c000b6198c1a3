//! # MDA Tools - 配置与日志格式
//!
//! **依赖原则**: 只依赖 `mda-protocol`，避免依赖 `mda-driver` / `mda-client`
//!
//! ## 包含模块
//!
//! - `config` - 捕获配置（只读结构）与加载
//! - `shot_log` - 拍摄日志格式（JSON Lines）

// ⚠️ 禁止引入 mda-client
// use mda_client::*;  // ❌ 禁止

pub mod config;
pub mod shot_log;

// 重新导出常用类型
pub use config::{
    CaptureConfig, ConfigError, GroupOrder, REFERENCE_KEY, ResolvedConfig, SessionPaths,
    ZoomGroup, ZoomLevels, load_document,
};
pub use shot_log::{JsonlShotLog, LogHeader, ShotRecord};
