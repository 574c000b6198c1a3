//! 执行捕获会话

use crate::app_config::{AppConfig, default_capture_root, resolve_config_path};
use crate::operator::OperatorGate;
use crate::simulate;
use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::Args;
use mda_client::{CaptureError, RunSummary, SessionOptions, ShotPlan, run_capture};
use mda_tools::{JsonlShotLog, LogHeader, SessionPaths};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::info;

/// 捕获命令参数
#[derive(Args, Debug)]
pub struct RunCommand {
    /// 配置文件（.json 或 .toml）
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 捕获根目录（每次会话在其下新建目录）
    #[arg(long)]
    pub capture_dir: Option<PathBuf>,

    /// 对模拟相机执行
    #[arg(long)]
    pub simulate: bool,

    /// 模拟模式下使用真实等待
    #[arg(long, requires = "simulate")]
    pub realtime: bool,

    /// 不提示，直接执行所有拍摄
    #[arg(short, long)]
    pub yes: bool,
}

impl RunCommand {
    pub fn execute(&self, stop: Arc<AtomicBool>) -> Result<()> {
        let config_path = resolve_config_path(self.config.as_deref());
        let app = AppConfig::load(&config_path)?;
        let config = app.capture.resolve().context("配置校验失败")?;
        let plan = ShotPlan::from_config(&config);
        println!("📄 Config: {}", config_path.display());
        println!("📋 {} shot(s) planned for {}", plan.len(), config.project_id);

        if !self.simulate {
            bail!("没有编译任何相机硬件后端；使用 --simulate 对模拟相机执行");
        }

        let root = self.capture_dir.clone().unwrap_or_else(default_capture_root);
        let paths = SessionPaths::new(&root, &config.project_id, &config.device_code, &Local::now());
        paths.create().context("创建会话目录失败")?;
        println!("📁 Session: {}", paths.session_dir.display());

        let header = LogHeader {
            project_id: config.project_id.clone(),
            device_code: config.device_code.clone(),
            created: Some(Local::now()),
            metadata: config.header.clone(),
        };
        let mut log = JsonlShotLog::open(&paths.log_path, &header).context("打开拍摄日志失败")?;

        let options = SessionOptions::new(&paths.session_dir, config.project_id.clone())
            .driver(app.driver.clone())
            .timing(app.timing.clone())
            .with_config_waits(&config)
            .clock(simulate::clock(self.realtime));
        let (mut backend, device) = simulate::backend();
        let mut gate = OperatorGate::new(!self.yes, stop);

        info!("Starting capture session");
        let outcome = run_capture(&mut backend, options, &plan, &mut log, &mut gate);
        println!();
        match outcome {
            Ok(summary) => {
                print_summary(&summary);
                println!("🧪 Simulated captures: {}", device.capture_count());
                println!("📝 Log: {}", paths.log_path.display());
                Ok(())
            },
            Err(CaptureError::Aborted(category)) => {
                println!("⚠️  Aborted before '{}'; camera released and closed", category);
                println!("📝 Log: {}", paths.log_path.display());
                Ok(())
            },
            Err(e) => Err(e).context("捕获会话失败"),
        }
    }
}

fn print_summary(summary: &RunSummary) {
    let marker = if summary.is_clean() { "✅" } else { "⚠️ " };
    println!(
        "{} {} shot(s), {} captured, {} asset(s) logged",
        marker, summary.shots_attempted, summary.shots_captured, summary.assets_logged
    );
    if summary.fallback_shots > 0 {
        println!("   {} shot(s) recovered by directory scan", summary.fallback_shots);
    }
    for ramp in &summary.ramp_failures {
        println!("   zoom ramp failed: {}", ramp);
    }
    for (category, reason) in &summary.failed {
        println!("   ❌ {}: {}", category, reason);
    }
}
