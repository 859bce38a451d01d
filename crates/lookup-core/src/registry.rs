//! # NodeRegistry：本地拓扑快照
//!
//! ## 核心意图（Why）
//! - 保存本进程所知的 `uid -> RegisterNode` 映射，作为刷新循环、请求分发与管理面的共享状态；
//! - 所有读操作返回按 uid 升序排列的副本，使故障转移顺序在各节点间可复现。
//!
//! ## 行为契约（What）
//! - `add`：按 uid upsert，后写者胜；
//! - `erase`：两阶段“先扫描、后删除”，只删除谓词命中的记录；
//! - `sorted_snapshot` / `filtered_sorted_snapshot`：返回克隆后的有序序列，不暴露内部引用；
//! - 每个操作在整个执行期间持有同一把读写锁，外部不会观察到“半完成”的状态。
//!
//! ## 风险提示（Trade-offs）
//! - 读操作会克隆记录，规模在数百节点以内时开销可忽略；
//! - 锁只覆盖内存操作，调用方不得在持锁期间发起网络请求（本类型的 API 本身无法做到这一点）。

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::{
    consts::STATIC_LOOKUP_UID_PREFIX,
    filter::NodeQueryFilter,
    node::{NodeType, RegisterNode, Scheme, ServiceNode},
    uid,
};

/// 进程级节点注册表。
///
/// 构造一次后以 `Arc` 共享；身份字段（本节点 uid、类型、标识符、静态命名节点）在构造后不可变，
/// 因此无需加锁即可读取。
#[derive(Debug)]
pub struct NodeRegistry {
    app_uid: String,
    node_type: NodeType,
    node_info: String,
    static_lookups: Vec<String>,
    nodes: RwLock<BTreeMap<String, RegisterNode>>,
}

impl NodeRegistry {
    /// 初始化注册表。
    ///
    /// - **输入**：本节点服务类型、可读标识符（通常由监听地址派生）、静态命名节点地址列表；
    /// - **后置条件**：生成形如 `<node_type>-<uuid>` 的新 uid，映射为空。
    pub fn new(
        node_type: impl Into<NodeType>,
        identifier: impl Into<String>,
        static_lookups: Vec<String>,
    ) -> Self {
        let node_type = node_type.into();
        let app_uid = uid::node_uid(node_type.as_str());
        debug!(%app_uid, %node_type, "node registry initialised");
        Self {
            app_uid,
            node_type,
            node_info: identifier.into(),
            static_lookups,
            nodes: RwLock::new(BTreeMap::new()),
        }
    }

    /// 本节点 uid。
    #[must_use]
    pub fn app_uid(&self) -> &str {
        &self.app_uid
    }

    #[must_use]
    pub fn node_type(&self) -> &NodeType {
        &self.node_type
    }

    /// 构造时传入的标识符。
    #[must_use]
    pub fn node_info(&self) -> &str {
        &self.node_info
    }

    #[must_use]
    pub fn static_lookups(&self) -> &[String] {
        &self.static_lookups
    }

    /// 按 uid 插入或覆盖记录。
    pub fn add(&self, node: RegisterNode) {
        self.nodes.write().insert(node.uid().to_owned(), node);
    }

    /// 删除所有满足谓词的记录，返回删除条数。
    pub fn erase<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&RegisterNode) -> bool,
    {
        let mut nodes = self.nodes.write();
        let doomed: Vec<String> = nodes
            .iter()
            .filter(|(_, node)| predicate(node))
            .map(|(uid, _)| uid.clone())
            .collect();
        for uid in &doomed {
            nodes.remove(uid);
        }
        doomed.len()
    }

    /// 删除指定 uid，返回是否存在。
    pub fn erase_uid(&self, uid: &str) -> bool {
        self.erase(|node| node.uid() == uid) > 0
    }

    /// 全部记录，按 uid 升序。
    #[must_use]
    pub fn sorted_snapshot(&self) -> Vec<RegisterNode> {
        self.nodes.read().values().cloned().collect()
    }

    /// 同时通过 uid 过滤器与类型过滤器的记录，按 uid 升序。
    #[must_use]
    pub fn filtered_sorted_snapshot(
        &self,
        uid_filter: &NodeQueryFilter,
        type_filter: &NodeQueryFilter,
    ) -> Vec<RegisterNode> {
        self.nodes
            .read()
            .values()
            .filter(|node| !uid_filter.kill(node.uid()) && !type_filter.kill(node.node_type().as_str()))
            .cloned()
            .collect()
    }

    /// 是否存在 `(uid, served_by_uid)` 完全一致的记录。
    #[must_use]
    pub fn contains_pair(&self, uid: &str, served_by_uid: &str) -> bool {
        self.nodes
            .read()
            .get(uid)
            .is_some_and(|node| node.served_by_uid == served_by_uid)
    }

    /// 按 uid 查询单条记录的副本。
    #[must_use]
    pub fn get(&self, uid: &str) -> Option<RegisterNode> {
        self.nodes.read().get(uid).cloned()
    }

    /// （重新）写入由配置合成的静态命名节点；重复调用只会覆盖同名记录。
    pub fn fill_static_lookup_nodes(&self) {
        let mut nodes = self.nodes.write();
        for (index, api_root) in self.static_lookups.iter().enumerate() {
            let uid = format!("{STATIC_LOOKUP_UID_PREFIX}{index}");
            let node = RegisterNode::from_service(ServiceNode::new(
                uid.clone(),
                NodeType::lookup(),
                api_root.clone(),
                Scheme::default(),
            ));
            nodes.insert(uid, node);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}
