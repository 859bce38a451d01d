//! # hooks 模块说明
//!
//! ## 设计定位（Why）
//! - 管理面收到的事件（调整日志级别、导出调用栈、拓扑变化通知……）需要广播给多个订阅者；
//! - 以事件 id 为键保存有序回调列表，派发时全部执行、结果取逻辑与。
//!
//! ## 契约边界（What）
//! - 同一 id 可注册多个回调，按注册顺序执行；
//! - 某个回调返回 `false` 不会阻止后续回调执行；
//! - 未注册任何回调的 id 视为“无动作”，返回 `false` 而不是错误。

use std::{fmt, sync::Arc};

use dashmap::DashMap;
use tracing::{info, warn};

/// 事件回调：接收事件参数，返回是否处理成功。
pub type EventHook = Arc<dyn Fn(&[String]) -> bool + Send + Sync>;

/// 内置的系统事件 id。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SysEventId {
    /// 调整日志级别，参数为单个整数。
    SetLogLevel,
    /// 刷新业务缓存。
    CacheRefresh,
    /// 命名节点通知拓扑已变化。
    NodeUpdatedNotify,
    /// 导出调用栈快照。
    DumpAppStack,
}

impl SysEventId {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SysEventId::SetLogLevel => "setLogLevel",
            SysEventId::CacheRefresh => "cacheRefresh",
            SysEventId::NodeUpdatedNotify => "nodeUpdatedNotify",
            SysEventId::DumpAppStack => "dumpAppStack",
        }
    }
}

impl fmt::Display for SysEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 多订阅者事件回调表。
///
/// - 底层使用 `DashMap`，注册与派发可并发进行；
/// - 派发前先克隆回调列表再释放分片锁，因此回调内部可以安全地注册新的回调。
#[derive(Default)]
pub struct EventHookRegistry {
    hooks: DashMap<String, Vec<EventHook>>,
}

impl EventHookRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个回调。
    pub fn register_hook<F>(&self, event_id: impl Into<String>, hook: F)
    where
        F: Fn(&[String]) -> bool + Send + Sync + 'static,
    {
        self.hooks
            .entry(event_id.into())
            .or_default()
            .push(Arc::new(hook));
    }

    /// 为内置系统事件追加回调。
    pub fn register_sys_hook<F>(&self, event_id: SysEventId, hook: F)
    where
        F: Fn(&[String]) -> bool + Send + Sync + 'static,
    {
        self.register_hook(event_id.as_str(), hook);
    }

    /// 派发事件，返回所有回调结果的逻辑与；无回调时返回 `false`。
    pub fn dispatch(&self, event_id: &str, args: &[String]) -> bool {
        let hooks = match self.hooks.get(event_id) {
            Some(entry) => entry.value().clone(),
            None => {
                warn!(event_id, "event id takes no action");
                return false;
            }
        };

        warn!(event_id, hook_count = hooks.len(), "dispatching event");
        let mut aggregate = true;
        for (index, hook) in hooks.iter().enumerate() {
            let result = hook(args);
            info!(event_id, hook = index + 1, result, "event hook executed");
            aggregate &= result;
        }
        aggregate
    }

    /// 某个事件 id 上已注册的回调数量。
    #[must_use]
    pub fn hook_count(&self, event_id: &str) -> usize {
        self.hooks.get(event_id).map_or(0, |entry| entry.len())
    }
}

impl fmt::Debug for EventHookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHookRegistry")
            .field("event_ids", &self.hooks.len())
            .finish()
    }
}
