//! 日志初始化
//!
//! 安装 `tracing-subscriber` 的 fmt 订阅者（`RUST_LOG` 优先，否则使用默认指令），
//! 并通过 `tracing-log` 把 `log` 记录桥接到 `tracing`。

use tracing::subscriber::SetGlobalDefaultError;
use tracing_log::LogTracer;
use tracing_subscriber::EnvFilter;

/// 默认过滤指令
pub const DEFAULT_DIRECTIVE: &str = "info";

/// 以 `info` 为默认级别初始化日志（重复调用无副作用）
pub fn init() {
    let _ = try_init_with(DEFAULT_DIRECTIVE);
}

/// 以指定的默认指令初始化日志
///
/// 已经安装过全局订阅者时返回错误。
pub fn try_init_with(default_directive: &str) -> Result<(), SetGlobalDefaultError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Err(e) = LogTracer::init() {
        tracing::debug!("log bridge not installed: {}", e);
    }
    Ok(())
}
