//! 日志初始化 - 宿主应用调用一次

use tracing_subscriber::{fmt, EnvFilter};

/// 初始化 tracing 订阅器
///
/// 过滤器取自 `RUST_LOG`，未设置时默认 `notify_center=info`。
/// 重复调用安全（后续调用是 no-op）。
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("notify_center=info"));

    let _ = fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .try_init();
}
