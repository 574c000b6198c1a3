//! 配置管理命令
//!
//! 生成示例配置、校验配置

use crate::app_config::{AppConfig, default_config_path, resolve_config_path};
use anyhow::{Context, Result, bail};
use clap::Subcommand;
use mda_tools::ZoomGroup;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 写出示例配置
    Init {
        /// 输出路径（默认为用户配置目录；扩展名决定格式）
        path: Option<PathBuf>,

        /// 覆盖已有文件
        #[arg(long)]
        force: bool,
    },

    /// 检查配置
    Check {
        /// 配置文件
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// 显示配置文件路径
    Path,
}

impl ConfigCommand {
    pub fn execute(self) -> Result<()> {
        match self {
            ConfigCommand::Init { path, force } => {
                Self::init_(&path.unwrap_or_else(default_config_path), force)
            },
            ConfigCommand::Check { config } => Self::check_(&resolve_config_path(config.as_deref())),
            ConfigCommand::Path => {
                println!("{}", resolve_config_path(None).display());
                Ok(())
            },
        }
    }

    fn init_(path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            bail!("配置文件已存在: {}（使用 --force 覆盖）", path.display());
        }
        sample().save(path)?;
        println!("✅ 已写出示例配置: {}", path.display());
        Ok(())
    }

    fn check_(path: &Path) -> Result<()> {
        if !path.exists() {
            println!("⚠️  {} 不存在，使用默认配置", path.display());
        }
        let app = AppConfig::load(path)?;
        let config = app.capture.resolve().context("配置校验失败")?;

        println!("✅ {}", path.display());
        println!("  项目: {} / {}", config.project_id, config.device_code);
        println!(
            "  曝光: Av {} | ISO {} | Tv {}",
            config.aperture_label, config.iso_label, config.reference_tv_label
        );
        for group in ZoomGroup::SEQUENCE {
            let count = config.group(group).map_or(0, |g| g.categories.len());
            println!(
                "  {:<9} level {:>3}: {} shot(s)",
                group.name(),
                group.level(&config.zoom),
                count
            );
        }
        println!("  共 {} 张", config.shot_count());
        Ok(())
    }
}

/// 示例配置：参考贴纸 + 每组一个类别
fn sample() -> AppConfig {
    let mut app = AppConfig::default();
    let categories = [
        ("CAT_SEPTUM", "septum"),
        ("CAT_FLANGE", "flange"),
        ("CAT_RIM", "rim"),
        ("CAT_HORN", "horn"),
    ];
    for (key, label) in categories {
        app.capture
            .categories
            .insert(key.to_string(), label.to_string());
    }
    let keys = |k: &[&str]| k.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    let orders = &mut app.capture.orders;
    orders.feature_order = keys(&["CAT_HORN", "CAT_RIM", "CAT_FLANGE", "CAT_SEPTUM"]);
    orders.order_z140 = keys(&["CAT_REF", "CAT_SEPTUM"]);
    orders.order_z120 = keys(&["CAT_FLANGE"]);
    orders.order_z055 = keys(&["CAT_RIM"]);
    orders.order_z110 = keys(&["CAT_HORN"]);
    app.capture.tv_map = BTreeMap::from([("CAT_SEPTUM".to_string(), "1/125".to_string())]);
    app.capture.excel_header = BTreeMap::from([
        ("PART_NO".to_string(), String::new()),
        ("SERIAL_NO".to_string(), String::new()),
    ]);
    app
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_is_valid() {
        let config = sample().capture.resolve().unwrap();
        assert_eq!(config.shot_count(), 5);
        assert_eq!(config.tv_for("septum"), "1/125");
    }

    #[test]
    fn test_init_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera_config.json");
        ConfigCommand::Init {
            path: Some(path.clone()),
            force: false,
        }
        .execute()
        .unwrap();
        assert!(path.exists());

        let again = ConfigCommand::Init {
            path: Some(path.clone()),
            force: false,
        }
        .execute();
        assert!(again.is_err());

        ConfigCommand::Check { config: Some(path) }.execute().unwrap();
    }
}
