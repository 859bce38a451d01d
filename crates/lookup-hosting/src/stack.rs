//! 调用栈快照落盘。
//!
//! 快照以追加方式写入 `<dir>/<节点类型>.<标识符>.stack`，每段以时间戳与触发原因开头。运维触发的导出受
//! 最小间隔限制，进程退出时的导出不受限制。

use std::{
    backtrace::Backtrace,
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use tracing::{info, warn};

/// 两次按需导出之间的最小间隔。
pub const ON_DEMAND_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct StackDumper {
    path: PathBuf,
    min_interval: Duration,
    last_on_demand: Mutex<Option<Instant>>,
}

impl StackDumper {
    pub fn new(dir: impl AsRef<Path>, app_name: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{app_name}.stack")),
            min_interval: ON_DEMAND_INTERVAL,
            last_on_demand: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 运维触发的导出；距上次导出不足最小间隔时跳过并返回 `Ok(false)`。
    pub fn dump_on_demand(&self) -> io::Result<bool> {
        {
            let mut last = self.last_on_demand.lock();
            let now = Instant::now();
            if let Some(previous) = *last
                && now.duration_since(previous) < self.min_interval
            {
                warn!(path = %self.path.display(), "stack dump throttled");
                return Ok(false);
            }
            *last = Some(now);
        }
        self.write_snapshot("on-demand")?;
        Ok(true)
    }

    /// 退出前的导出，不受频率限制。
    pub fn dump_at_exit(&self) -> io::Result<()> {
        self.write_snapshot("exit")
    }

    fn write_snapshot(&self, reason: &str) -> io::Result<()> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        writeln!(file, "===== {stamp} stack snapshot ({reason}) =====")?;
        writeln!(file, "{}", Backtrace::force_capture())?;
        file.flush()?;
        info!(path = %self.path.display(), reason, "stack snapshot written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("lookup-stack-{tag}-{}", lookup_core::uid::generate_uid()))
    }

    #[test]
    fn on_demand_dumps_are_rate_limited() {
        let dir = scratch_dir("throttle");
        let dumper = StackDumper::new(&dir, "worker");
        assert!(dumper.dump_on_demand().expect("first dump"));
        assert!(!dumper.dump_on_demand().expect("second dump"));

        let contents = fs::read_to_string(dumper.path()).expect("dump file exists");
        assert_eq!(contents.matches("stack snapshot (on-demand)").count(), 1);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn exit_dump_ignores_the_rate_limit_and_appends() {
        let dir = scratch_dir("exit");
        let dumper = StackDumper::new(&dir, "worker");
        assert!(dumper.dump_on_demand().expect("on-demand dump"));
        dumper.dump_at_exit().expect("exit dump");

        assert_eq!(dumper.path(), dir.join("worker.stack"));
        let contents = fs::read_to_string(dumper.path()).expect("dump file exists");
        assert!(contents.contains("(on-demand)"));
        assert!(contents.contains("(exit)"));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn zero_interval_never_throttles() {
        let dir = scratch_dir("zero");
        let dumper = StackDumper::new(&dir, "worker").with_min_interval(Duration::ZERO);
        assert!(dumper.dump_on_demand().expect("first"));
        assert!(dumper.dump_on_demand().expect("second"));
        let _ = fs::remove_dir_all(dir);
    }
}
