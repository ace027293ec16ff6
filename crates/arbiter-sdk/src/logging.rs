//! 日志初始化
//!
//! 安装 `tracing-subscriber` 的 fmt 输出，过滤规则取自 `RUST_LOG`，
//! 未设置时使用给定的默认指令。`log` crate 的记录经 `tracing-log` 转发。

use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static INSTALLED: OnceLock<bool> = OnceLock::new();

/// 以 `info` 为默认级别初始化日志
///
/// 可重复调用，只有第一次生效。返回全局 subscriber 是否由本函数安装（重复调用返回首次的结果）。
pub fn init_logging() -> bool {
    init_logging_with("info")
}

/// 以给定默认指令初始化日志（如 `"arbiter_driver=debug,info"`）
pub fn init_logging_with(default_directive: &str) -> bool {
    *INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive));
        let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();

        if tracing::subscriber::set_global_default(subscriber).is_err() {
            // 已有其他全局 subscriber
            return false;
        }
        if let Err(e) = tracing_log::LogTracer::init() {
            tracing::debug!("log bridge not installed: {}", e);
        }
        true
    })
}
