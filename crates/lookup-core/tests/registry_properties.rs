//! 注册表、过滤器与轮询游标的性质测试。
//!
//! - **Why**：这三个结构是分发与刷新逻辑的地基，其不变量以随机输入验证比枚举样例更可靠；
//! - **What**：覆盖 erase 的精确性、exclude 优先级、include 语义以及轮询覆盖性。

use std::collections::{BTreeMap, BTreeSet};

use lookup_core::{
    LoadBalancer, NodeQueryFilter, NodeRegistry, NodeType, RegisterNode, Scheme, ServiceNode,
};
use proptest::prelude::*;

fn record(uid: &str, node_type: &str) -> RegisterNode {
    RegisterNode::from_service(ServiceNode::new(
        uid,
        node_type,
        format!("{uid}.invalid:80"),
        Scheme::Http,
    ))
}

fn name() -> impl Strategy<Value = String> {
    "[a-e]{1,3}"
}

proptest! {
    /// erase(P) 之后：不存在满足 P 的记录，且所有不满足 P 的旧记录原样保留。
    #[test]
    fn erase_removes_exactly_the_matching_records(
        entries in prop::collection::btree_map(name(), prop::sample::select(vec!["worker", "lookup", "gateway"]), 0..24),
        doomed_type in prop::sample::select(vec!["worker", "lookup", "gateway"]),
    ) {
        let registry = NodeRegistry::new("tester", "id", Vec::new());
        for (uid, node_type) in &entries {
            registry.add(record(uid, node_type));
        }
        let before = registry.sorted_snapshot();

        registry.erase(|node| node.node_type().as_str() == doomed_type);
        let after = registry.sorted_snapshot();

        prop_assert!(after.iter().all(|node| node.node_type().as_str() != doomed_type));
        let expected: Vec<_> = before
            .into_iter()
            .filter(|node| node.node_type().as_str() != doomed_type)
            .collect();
        prop_assert_eq!(after, expected);
    }

    /// exclude 非空时，kill(name) 只取决于 exclude，与 include 无关。
    #[test]
    fn non_empty_exclude_decides_alone(
        exclude in prop::collection::btree_set(name(), 1..6),
        include in prop::collection::btree_set(name(), 0..6),
        candidate in name(),
    ) {
        let filter = NodeQueryFilter { exclude: exclude.clone(), include };
        prop_assert_eq!(filter.kill(&candidate), exclude.contains(&candidate));
    }

    /// exclude 为空且 include 非空时，kill(name) == name ∉ include。
    #[test]
    fn include_only_kills_unlisted_names(
        include in prop::collection::btree_set(name(), 1..6),
        candidate in name(),
    ) {
        let filter = NodeQueryFilter { exclude: BTreeSet::new(), include: include.clone() };
        prop_assert_eq!(filter.kill(&candidate), !include.contains(&candidate));
    }

    /// 连续 N 次调用恰好覆盖 [0, N) 各一次且按序，第 N+1 次回到 0。
    #[test]
    fn round_robin_covers_every_index(count in 1usize..32) {
        let balancer = LoadBalancer::new();
        let worker = NodeType::new("worker");
        let seen: Vec<_> = (0..count).map(|_| balancer.next_index(&worker, count)).collect();
        prop_assert_eq!(seen, (0..count).collect::<Vec<_>>());
        prop_assert_eq!(balancer.next_index(&worker, count), 0);
    }

    /// 过滤快照始终有序，且内容与逐条判定一致。
    #[test]
    fn filtered_snapshot_is_sorted_and_exact(
        entries in prop::collection::btree_map(name(), prop::sample::select(vec!["worker", "lookup"]), 0..24),
        uid_filter in prop::collection::btree_set(name(), 0..4),
    ) {
        let registry = NodeRegistry::new("tester", "id", Vec::new());
        for (uid, node_type) in &entries {
            registry.add(record(uid, node_type));
        }
        let uid_filter = NodeQueryFilter::exclude(uid_filter);
        let type_filter = NodeQueryFilter::include(["worker"]);
        let snapshot = registry.filtered_sorted_snapshot(&uid_filter, &type_filter);

        let expected: BTreeMap<_, _> = entries
            .iter()
            .filter(|(uid, node_type)| !uid_filter.kill(uid) && **node_type == "worker")
            .collect();
        let uids: Vec<_> = snapshot.iter().map(|node| node.uid().to_owned()).collect();
        prop_assert_eq!(uids, expected.keys().map(|uid| (*uid).clone()).collect::<Vec<_>>());
    }
}

#[test]
fn end_to_end_worker_query() {
    let registry = NodeRegistry::new("gateway", "id", Vec::new());
    registry.add(record("w-2", "worker"));
    registry.add(record("l-1", "lookup"));
    registry.add(record("w-1", "worker"));

    let workers = registry.filtered_sorted_snapshot(
        &NodeQueryFilter::pass_all(),
        &NodeQueryFilter::include(["worker"]),
    );
    let uids: Vec<_> = workers.iter().map(RegisterNode::uid).collect();
    assert_eq!(uids, ["w-1", "w-2"]);
}
