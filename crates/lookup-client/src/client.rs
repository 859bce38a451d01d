//! # DiscoveryClient：注册、刷新与分发
//!
//! ## 核心意图（Why）
//! - 作为每个服务进程与命名节点之间的唯一通道：周期性心跳注册、拉取拓扑、退出时注销；
//! - 为业务代码提供“按类型发请求”的入口，内部完成轮询选点、失败转移与不可达节点剔除。
//!
//! ## 架构定位（Where）
//! - 持有进程唯一的 [`NodeRegistry`]，与管理面处理器（`admin` 模块）共享；
//! - [`LoadBalancer`] 与 [`EventHookRegistry`] 由装配方构造后注入，客户端不创建全局单例；
//! - 关闭信号以 [`CancellationToken`] 注入，由宿主的关闭协调器负责取消。
//!
//! ## 行为契约（What）
//! - 刷新互斥：同一时刻至多一次刷新在执行，使用独立于注册表锁的异步互斥量；
//! - 刷新失败时注册表保持原样（宁可陈旧，不可清空）；
//! - 分发时注册表锁只在读取候选快照的瞬间持有，网络请求全部在锁外进行；
//! - 剔除与刷新可能交错，但 `erase` 与 `add` 均幂等，只影响收敛速度而非正确性。

use std::{collections::HashMap, sync::Arc, time::Duration};

use bytes::Bytes;
use futures::future::BoxFuture;
use lookup_core::{
    LoadBalancer, NodeQueryFilter, NodeRegistry, NodeType, RegisterNode, ServiceNode,
    consts::{
        LOOKUP_DEREGISTER_PATH, LOOKUP_QUERY_PATH, LOOKUP_REGISTER_PATH, is_static_lookup_uid,
    },
    rpc::{QueryRequest, QueryResponse, RegisterRequest},
};
use serde::Serialize;
use tokio::{
    sync::{Mutex as AsyncMutex, mpsc},
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::{error::DiscoveryError, hooks::EventHookRegistry, transport::Transport};

/// 刷新循环的可调参数。
#[derive(Clone, Debug)]
pub struct DiscoverySettings {
    /// 心跳与拓扑刷新周期。
    pub refresh_interval: Duration,
    /// “拓扑已变化”信号队列容量，写满后新信号被静默丢弃。
    pub dirty_queue_capacity: usize,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(1),
            dirty_queue_capacity: 1024,
        }
    }
}

/// 一次成功刷新的统计。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// 写入（新增或覆盖）的有效记录数。
    pub upserted: usize,
    /// 因无效被跳过的记录数。
    pub skipped: usize,
    /// 因命名节点不再报告而被裁剪的记录数。
    pub pruned: usize,
}

/// 服务发现客户端。
pub struct DiscoveryClient {
    registry: Arc<NodeRegistry>,
    balancer: Arc<LoadBalancer>,
    events: Arc<EventHookRegistry>,
    transport: Arc<dyn Transport>,
    refresh_lock: AsyncMutex<()>,
    dirty_tx: mpsc::Sender<()>,
    dirty_rx: AsyncMutex<mpsc::Receiver<()>>,
    settings: DiscoverySettings,
}

impl DiscoveryClient {
    pub fn new(
        registry: Arc<NodeRegistry>,
        balancer: Arc<LoadBalancer>,
        events: Arc<EventHookRegistry>,
        transport: Arc<dyn Transport>,
        settings: DiscoverySettings,
    ) -> Self {
        let (dirty_tx, dirty_rx) = mpsc::channel(settings.dirty_queue_capacity.max(1));
        Self {
            registry,
            balancer,
            events,
            transport,
            refresh_lock: AsyncMutex::new(()),
            dirty_tx,
            dirty_rx: AsyncMutex::new(dirty_rx),
            settings,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn balancer(&self) -> &Arc<LoadBalancer> {
        &self.balancer
    }

    #[must_use]
    pub fn events(&self) -> &Arc<EventHookRegistry> {
        &self.events
    }

    #[must_use]
    pub fn app_uid(&self) -> &str {
        self.registry.app_uid()
    }

    /// 标记拓扑已变化，促使刷新循环尽快拉取一次。
    ///
    /// 队列写满时直接丢弃：周期刷新本身就限定了最迟收敛时间。
    pub fn notify_topology_dirty(&self) {
        if let Err(err) = self.dirty_tx.try_send(()) {
            debug!(error = %err, "topology dirty signal dropped");
        }
    }

    /// 注册 / 刷新主循环，直到 `shutdown` 被取消。
    ///
    /// # 教案式说明
    /// - **等待（How）**：每轮等待周期计时、拓扑变化信号与关闭信号中最先到达的一个；
    /// - **计时到达**：先刷新拓扑，再向命名节点重发所有本地节点的注册（心跳即重注册）；
    /// - **变化信号**：只刷新拓扑；
    /// - **关闭信号**：注销所有本地节点后退出循环。关闭优先级最高，避免退出时再做一次无意义的刷新。
    pub async fn run(&self, local_nodes: Vec<ServiceNode>, shutdown: CancellationToken) {
        self.registry.fill_static_lookup_nodes();
        let mut dirty = self.dirty_rx.lock().await;
        let period = self.settings.refresh_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            app_uid = self.app_uid(),
            local_nodes = local_nodes.len(),
            "discovery loop started"
        );

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    warn!("system exiting, deregistering local nodes");
                    self.deregister_all(&local_nodes).await;
                    break;
                }
                Some(()) = dirty.recv() => {
                    warn!("register nodes modified, refreshing on update notification");
                    self.refresh_logged().await;
                }
                _ = ticker.tick() => {
                    self.refresh_logged().await;
                    self.register_all(&local_nodes).await;
                }
            }
        }
        info!(app_uid = self.app_uid(), "discovery loop stopped");
    }

    /// 生成注销回调，供关闭协调器在非信号路径上执行同样的注销。
    pub fn deregistration_hook(
        self: &Arc<Self>,
        local_nodes: Vec<ServiceNode>,
    ) -> impl Fn() -> BoxFuture<'static, bool> + Send + Sync + 'static {
        let client = Arc::clone(self);
        let local_nodes = Arc::new(local_nodes);
        move || -> BoxFuture<'static, bool> {
            let client = Arc::clone(&client);
            let local_nodes = Arc::clone(&local_nodes);
            Box::pin(async move {
                client.deregister_all(&local_nodes).await;
                true
            })
        }
    }

    /// 向命名节点注册所有本地节点，返回成功条数。
    pub async fn register_all(&self, local_nodes: &[ServiceNode]) -> usize {
        self.announce(local_nodes, "register", LOOKUP_REGISTER_PATH)
            .await
    }

    /// 向命名节点注销所有本地节点，返回成功条数。
    pub async fn deregister_all(&self, local_nodes: &[ServiceNode]) -> usize {
        self.announce(local_nodes, "deregister", LOOKUP_DEREGISTER_PATH)
            .await
    }

    async fn announce(&self, local_nodes: &[ServiceNode], action: &str, path: &str) -> usize {
        let mut delivered = 0;
        for node in local_nodes {
            let sender = format!("{action}+{}", node.uid);
            let request = RegisterRequest::from(node.clone());
            match self.send_lookup_request(&sender, path, &request).await {
                Ok(_) => delivered += 1,
                Err(err) => debug!(%sender, error = %err, "lookup announcement failed"),
            }
        }
        delivered
    }

    async fn refresh_logged(&self) {
        if let Err(err) = self.fetch_all_register_nodes().await {
            error!(error = %err, "refreshing register nodes failed");
        }
    }

    /// 从命名节点拉取拓扑并与本地注册表对账。
    ///
    /// # 契约说明（What）
    /// - 任何失败（分发失败、应答无法解析、缺少 `nodes`）都原样保留注册表；
    /// - 成功时写入全部有效记录，随后删除 `(uid, served_by_uid)` 不在本次结果中的记录；
    /// - 对账基准是本次应答独立构建的快照，而不是写入过程中的注册表本身。
    pub async fn fetch_all_register_nodes(&self) -> Result<RefreshSummary, DiscoveryError> {
        let _serial = self.refresh_lock.lock().await;

        let nodes = self.query_register_nodes().await?;
        let mut summary = RefreshSummary::default();
        let mut reported: HashMap<String, String> = HashMap::with_capacity(nodes.len());
        for node in nodes {
            if !node.is_valid() {
                error!(?node, "skipping invalid service node");
                summary.skipped += 1;
                continue;
            }
            reported.insert(node.uid().to_owned(), node.served_by_uid.clone());
            self.registry.add(node);
            summary.upserted += 1;
        }

        summary.pruned = self.registry.erase(|node| {
            reported
                .get(node.uid())
                .is_none_or(|served_by| *served_by != node.served_by_uid)
        });
        debug!(?summary, "register nodes refreshed");
        Ok(summary)
    }

    async fn query_register_nodes(&self) -> Result<Vec<RegisterNode>, DiscoveryError> {
        let request = QueryRequest::excluding_self(self.app_uid());
        let body = self
            .send_lookup_request("fetchRegisterNodes", LOOKUP_QUERY_PATH, &request)
            .await?;
        let response: QueryResponse =
            serde_json::from_slice(&body).map_err(|source| DiscoveryError::Decode {
                context: "lookup query response",
                source,
            })?;
        response.nodes.ok_or(DiscoveryError::MissingNodes)
    }

    async fn send_lookup_request<T>(
        &self,
        sender: &str,
        path: &str,
        payload: &T,
    ) -> Result<Bytes, DiscoveryError>
    where
        T: Serialize + ?Sized,
    {
        self.send_to_target_type(sender, path, &NodeType::lookup(), payload, true)
            .await
    }

    /// 按服务类型分发请求：轮询选起点，环形尝试全部候选，首个 200 应答即返回。
    ///
    /// # 教案式说明
    /// - **候选（What）**：注册表中该类型的全部节点，按 uid 升序；若目标是命名节点池且为空，
    ///   先回填静态命名节点再重新筛选一次；
    /// - **剔除（How）**：某候选失败且不是本轮最后一个尝试对象时，只要 uid 不带静态前缀，
    ///   立即从注册表中删除；
    /// - **失败**：全部失败返回 [`DiscoveryError::AllRequestsFailed`]，发现层不再额外重试。
    pub async fn send_to_target_type<T>(
        &self,
        sender: &str,
        path: &str,
        target_type: &NodeType,
        payload: &T,
        read_body: bool,
    ) -> Result<Bytes, DiscoveryError>
    where
        T: Serialize + ?Sized,
    {
        let mut candidates = self.candidates_of_type(target_type);
        if candidates.is_empty() && target_type.is_lookup() {
            warn!(sender, "no lookup node known, refilling static lookup nodes");
            self.registry.fill_static_lookup_nodes();
            candidates = self.candidates_of_type(target_type);
        }
        self.send_to_candidates(sender, path, target_type, &candidates, payload, read_body)
            .await
    }

    /// 定向分发到指定 uid；`target_uid` 为空时退化为按类型分发。
    pub async fn send_to_uid<T>(
        &self,
        sender: &str,
        path: &str,
        target_type: &NodeType,
        target_uid: &str,
        payload: &T,
        read_body: bool,
    ) -> Result<Bytes, DiscoveryError>
    where
        T: Serialize + ?Sized,
    {
        if target_uid.is_empty() {
            return self
                .send_to_target_type(sender, path, target_type, payload, read_body)
                .await;
        }
        let candidates = self.registry.filtered_sorted_snapshot(
            &NodeQueryFilter::include([target_uid]),
            &NodeQueryFilter::include([target_type.as_str()]),
        );
        if candidates.is_empty() {
            return Err(DiscoveryError::NoTargetForUid {
                uid: target_uid.to_owned(),
                node_type: target_type.clone(),
            });
        }
        self.send_to_candidates(sender, path, target_type, &candidates, payload, read_body)
            .await
    }

    fn candidates_of_type(&self, target_type: &NodeType) -> Vec<RegisterNode> {
        self.registry.filtered_sorted_snapshot(
            &NodeQueryFilter::pass_all(),
            &NodeQueryFilter::include([target_type.as_str()]),
        )
    }

    async fn send_to_candidates<T>(
        &self,
        sender: &str,
        path: &str,
        target_type: &NodeType,
        candidates: &[RegisterNode],
        payload: &T,
        read_body: bool,
    ) -> Result<Bytes, DiscoveryError>
    where
        T: Serialize + ?Sized,
    {
        if candidates.is_empty() {
            return Err(DiscoveryError::NoTargetForType {
                node_type: target_type.clone(),
            });
        }
        let body = serde_json::to_vec(payload)
            .map(Bytes::from)
            .map_err(|source| DiscoveryError::Encode {
                sender: sender.to_owned(),
                source,
            })?;
        trace!(sender, body = %String::from_utf8_lossy(&body), "dispatching request");

        let count = candidates.len();
        let start = self.balancer.next_index(target_type, count);
        for attempt in 0..count {
            let node = &candidates[(start + attempt) % count];
            let url = node.join_url(path);
            trace!(sender, attempt = attempt + 1, count, uid = node.uid(), "trying target node");

            match self.transport.post(&url, body.clone(), read_body).await {
                Ok(response) if response.is_ok() => {
                    trace!(sender, %url, "request succeeded");
                    return Ok(response.body);
                }
                Ok(response) => {
                    error!(sender, %url, status = response.status, "request rejected");
                }
                Err(err) => {
                    error!(sender, %url, error = %err, "request failed");
                }
            }

            let is_last = attempt + 1 == count;
            if !is_last && !is_static_lookup_uid(node.uid()) && self.registry.erase_uid(node.uid())
            {
                warn!(uid = node.uid(), %url, "ejected failed node from registry");
            }
        }

        Err(DiscoveryError::AllRequestsFailed {
            node_type: target_type.clone(),
        })
    }
}

impl std::fmt::Debug for DiscoveryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryClient")
            .field("app_uid", &self.registry.app_uid())
            .field("known_nodes", &self.registry.len())
            .field("settings", &self.settings)
            .finish()
    }
}
