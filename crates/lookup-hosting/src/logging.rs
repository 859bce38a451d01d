use std::sync::OnceLock;

use tracing::{dispatcher, level_filters::LevelFilter, warn};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, reload};

use crate::error::LoggingError;

/// 安装状态的全局缓存，确保 `install` 仅执行一次。
static INSTALLED: OnceLock<LogLevelHandle> = OnceLock::new();

/// 运维协议中的数值日志级别映射。
///
/// | 数值 | 级别 |
/// | --- | --- |
/// | 0 | error |
/// | 1 | critical（映射为 warn） |
/// | 2 | warn |
/// | 3 | info |
/// | 4 | debug |
/// | 5 | trace |
///
/// 其它数值一律收紧到 critical。
#[must_use]
pub fn level_from_numeric(level: i64) -> LevelFilter {
    match level {
        0 => LevelFilter::ERROR,
        3 => LevelFilter::INFO,
        4 => LevelFilter::DEBUG,
        5 => LevelFilter::TRACE,
        _ => LevelFilter::WARN,
    }
}

/// 运行期调整全局日志级别的句柄。
#[derive(Clone, Debug)]
pub struct LogLevelHandle {
    handle: reload::Handle<EnvFilter, Registry>,
}

impl LogLevelHandle {
    /// 以数值级别替换当前过滤器，返回生效的级别。
    pub fn set_numeric(&self, level: i64) -> Result<LevelFilter, LoggingError> {
        let filter = level_from_numeric(level);
        self.handle.reload(EnvFilter::new(filter.to_string()))?;
        warn!(level, %filter, "log level changed");
        Ok(filter)
    }

    /// 当前过滤器的文本形式。
    pub fn current(&self) -> Result<String, LoggingError> {
        Ok(self.handle.with_current(ToString::to_string)?)
    }
}

/// 组装 `fmt + 可重载 EnvFilter` 的订阅器。
///
/// `RUST_LOG` 存在时优先生效，否则使用数值级别。
fn build(level: i64) -> (impl tracing::Subscriber + Send + Sync, LogLevelHandle) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_from_numeric(level).to_string()));
    let (filter, handle) = reload::Layer::new(filter);
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());
    (subscriber, LogLevelHandle { handle })
}

/// 安装全局日志订阅器。
///
/// # 教案式说明
/// - **意图（Why）**：进程启动时调用一次，之后所有模块的 `tracing` 宏输出到标准输出；
/// - **逻辑（How）**：检查重复安装与外部已设置的订阅器，随后设置全局默认订阅器并缓存句柄；
/// - **契约（What）**：重复调用返回 [`LoggingError::AlreadyInstalled`]；
///   外部已设置订阅器时返回 [`LoggingError::SubscriberAlreadySet`]。
pub fn install(level: i64) -> Result<LogLevelHandle, LoggingError> {
    if INSTALLED.get().is_some() {
        return Err(LoggingError::AlreadyInstalled);
    }
    if dispatcher::has_been_set() {
        return Err(LoggingError::SubscriberAlreadySet);
    }

    let (subscriber, handle) = build(level);
    tracing::subscriber::set_global_default(subscriber)?;
    INSTALLED
        .set(handle.clone())
        .map_err(|_| LoggingError::AlreadyInstalled)?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_levels_follow_the_admin_protocol() {
        let expected = [
            (0, LevelFilter::ERROR),
            (1, LevelFilter::WARN),
            (2, LevelFilter::WARN),
            (3, LevelFilter::INFO),
            (4, LevelFilter::DEBUG),
            (5, LevelFilter::TRACE),
            (42, LevelFilter::WARN),
            (-1, LevelFilter::WARN),
        ];
        for (numeric, level) in expected {
            assert_eq!(level_from_numeric(numeric), level, "numeric level {numeric}");
        }
    }

    #[test]
    fn handle_reloads_the_active_filter() {
        let (subscriber, handle) = build(3);
        tracing::subscriber::with_default(subscriber, || {
            assert_eq!(handle.set_numeric(5).expect("reload"), LevelFilter::TRACE);
            assert_eq!(handle.current().expect("filter alive"), "trace");

            handle.set_numeric(0).expect("reload");
            assert_eq!(handle.current().expect("filter alive"), "error");
        });
    }
}
