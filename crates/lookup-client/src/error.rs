//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 区分“传输层失败”（连接、超时、读取应答体）与“发现层失败”（无候选、全部失败、编解码）；
//! - 分发算法把传输失败与非 200 应答一视同仁地当作候选失败，因此传输错误只需保留可读上下文。
//!
//! ## 设计要求（What）
//! - 发现层错误必须点名服务类型（以及定向分发时的 uid），方便运维定位；
//! - 发现层不做应用级重试，需要重试的调用方自行再次调用。

use lookup_core::NodeType;
use thiserror::Error;

/// 传输层错误。
#[derive(Debug, Error)]
pub enum TransportError {
    /// 构造 HTTP 客户端失败。
    #[error("failed to build http client: {0}")]
    Build(#[source] reqwest::Error),

    /// 请求在一次自动重试后仍失败。
    #[error("request to `{url}` failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// 读取应答体失败。
    #[error("reading response body from `{url}` failed: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// 其它传输实现上报的失败（例如测试替身或非 HTTP 传输）。
    #[error("transport failure for `{url}`: {detail}")]
    Unavailable { url: String, detail: String },
}

/// 发现层错误。
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// 注册表中没有该类型的候选节点。
    #[error("no target node found for type `{node_type}`")]
    NoTargetForType { node_type: NodeType },

    /// 定向分发时，指定 uid 与类型的组合不存在。
    #[error("no target node found with uid `{uid}` and type `{node_type}`")]
    NoTargetForUid { uid: String, node_type: NodeType },

    /// 所有候选节点均失败。
    #[error("all requests failed for type `{node_type}`")]
    AllRequestsFailed { node_type: NodeType },

    /// 请求体序列化失败。
    #[error("failed to encode `{sender}` payload: {source}")]
    Encode {
        sender: String,
        #[source]
        source: serde_json::Error,
    },

    /// 应答体无法解析。
    #[error("failed to decode {context}: {source}")]
    Decode {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// 命名节点的查询应答缺少 `nodes` 字段。
    #[error("lookup query response carries no node list")]
    MissingNodes,
}
