//! # MDA CLI
//!
//! Command-line driver for MDA camera capture sessions.
//!
//! ```bash
//! # 生成示例配置
//! mda-cli config init
//!
//! # 检查配置并查看拍摄计划
//! mda-cli config check
//! mda-cli plan
//!
//! # 对模拟相机执行完整会话（每张拍摄前提示，--yes 跳过提示）
//! mda-cli run --simulate
//! ```
//!
//! Ctrl-C 在下一个操作员闸门处中止；相机总会被松开快门并关闭会话。

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

mod app_config;
mod commands;
mod operator;
mod simulate;

use commands::{ConfigCommand, PlanCommand, RunCommand};

/// MDA CLI - 相机捕获命令行工具
#[derive(Parser, Debug)]
#[command(name = "mda-cli")]
#[command(about = "Command-line driver for MDA camera capture sessions", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 打印拍摄计划
    Plan {
        #[command(flatten)]
        args: PlanCommand,
    },

    /// 执行捕获会话
    Run {
        #[command(flatten)]
        args: RunCommand,
    },
}

fn main() -> Result<()> {
    // 初始化日志
    let _ = mda_sdk::logging::try_init_with("warn,mda_cli=info,mda_client=info");

    let cli = Cli::parse();

    match cli.command {
        Commands::Config(cmd) => cmd.execute(),

        Commands::Plan { args } => args.execute(),

        Commands::Run { args } => {
            let stop = Arc::new(AtomicBool::new(false));
            let flag = stop.clone();
            ctrlc::set_handler(move || {
                eprintln!("\n🛑 收到停止信号，将在下一张拍摄前中止...");
                flag.store(true, Ordering::SeqCst);
            })
            .context("设置 Ctrl-C 处理器失败")?;

            args.execute(stop)
        },
    }
}
