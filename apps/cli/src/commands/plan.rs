//! 打印拍摄计划

use crate::app_config::{AppConfig, resolve_config_path};
use anyhow::{Context, Result};
use clap::Args;
use mda_client::ShotPlan;
use std::path::PathBuf;

/// 计划命令参数
#[derive(Args, Debug)]
pub struct PlanCommand {
    /// 配置文件（.json 或 .toml）
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl PlanCommand {
    pub fn execute(&self) -> Result<()> {
        let path = resolve_config_path(self.config.as_deref());
        let config = AppConfig::load(&path)?
            .capture
            .resolve()
            .context("配置校验失败")?;
        let plan = ShotPlan::from_config(&config);

        println!("📋 {} ({} shots)", config.project_id, plan.len());
        println!(
            "   Av {} | ISO {} | reference Tv {}",
            config.aperture_label, config.iso_label, config.reference_tv_label
        );
        for line in render(&plan) {
            println!("{}", line);
        }
        Ok(())
    }
}

/// 每张拍摄一行：序号、组、类别、快门、变焦目标
pub fn render(plan: &ShotPlan) -> Vec<String> {
    plan.iter()
        .enumerate()
        .map(|(i, shot)| {
            let zoom = match shot.request.zoom_target {
                Some(target) => format!("→ {}", target),
                None => "(hold)".to_string(),
            };
            let marker = if shot.request.is_reference { " *" } else { "" };
            format!(
                "{:>3}. {:<9} {:<28} {:<8} {}{}",
                i + 1,
                shot.group.name(),
                shot.request.category,
                shot.request.tv_label,
                zoom,
                marker
            )
        })
        .collect()
}
