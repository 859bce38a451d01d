use std::collections::HashMap;

use parking_lot::Mutex;

use crate::node::NodeType;

/// 按服务类型维护的轮询游标。
///
/// # 教案式说明
/// - **意图（Why）**：对同一类型的候选列表给出轮询起点，分发逻辑从该起点开始环形尝试；
/// - **执行（How）**：每个类型一个从 0 开始的游标，返回 `cursor % count` 后把游标推进为
///   `(cursor + 1) % count`；
/// - **并发（What）**：整张游标表由一把互斥锁保护。此处的竞争强度极低，不值得按类型分片。
///
/// 进程内只构造一次，以 `Arc` 注入到所有分发方。
#[derive(Debug, Default)]
pub struct LoadBalancer {
    cursors: Mutex<HashMap<NodeType, usize>>,
}

impl LoadBalancer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 返回本次轮询的起始下标；`candidate_count == 0` 时返回 0 且不改动状态。
    pub fn next_index(&self, service_type: &NodeType, candidate_count: usize) -> usize {
        if candidate_count == 0 {
            return 0;
        }
        let mut cursors = self.cursors.lock();
        let cursor = cursors.entry(service_type.clone()).or_insert(0);
        let current = *cursor % candidate_count;
        *cursor = (*cursor + 1) % candidate_count;
        current
    }
}
