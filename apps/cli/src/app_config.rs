//! CLI 配置文件
//!
//! 捕获配置（项目、相机、类别、顺序、快门覆盖）平铺在顶层，
//! 另外可选 `driver`（驱动时序）和 `timing`（会话阶段等待）两节。

use anyhow::{Context, Result};
use mda_client::SessionTiming;
use mda_driver::DriverConfig;
use mda_tools::{CaptureConfig, load_document};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 默认配置文件名
pub const CONFIG_FILE_NAME: &str = "camera_config.json";

/// CLI 配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(flatten)]
    pub capture: CaptureConfig,
    pub driver: DriverConfig,
    pub timing: SessionTiming,
}

impl AppConfig {
    /// 加载配置（文件不存在时返回默认值）
    pub fn load(path: &Path) -> Result<Self> {
        load_document(path).with_context(|| format!("加载配置失败: {}", path.display()))
    }

    /// 按扩展名写出（`.toml` 或 `.json`）
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => {
                toml::to_string_pretty(self).context("序列化 TOML 失败")?
            },
            _ => serde_json::to_string_pretty(self).context("序列化 JSON 失败")?,
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).context("创建配置目录失败")?;
        }
        fs::write(path, content).with_context(|| format!("写入配置失败: {}", path.display()))?;
        Ok(())
    }
}

/// 用户配置目录下的默认配置路径
pub fn default_config_path() -> PathBuf {
    match dirs::config_dir() {
        Some(mut dir) => {
            dir.push("mda");
            dir.push(CONFIG_FILE_NAME);
            dir
        },
        None => PathBuf::from(CONFIG_FILE_NAME),
    }
}

/// 配置路径：命令行参数 → 当前目录 → 用户配置目录
pub fn resolve_config_path(arg: Option<&Path>) -> PathBuf {
    if let Some(path) = arg {
        return path.to_path_buf();
    }
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return local;
    }
    default_config_path()
}

/// 默认捕获根目录（图片目录下的 `MDA Captures`）
pub fn default_capture_root() -> PathBuf {
    let mut dir = dirs::picture_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    dir.push("MDA Captures");
    dir
}
