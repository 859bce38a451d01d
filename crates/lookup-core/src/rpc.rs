//! # rpc 模块说明
//!
//! 服务节点与命名节点之间、以及管理面上往返的 JSON 报文。字段名沿用既有线路协议
//! （短横线风格），所有可选字段在为空时不序列化。

use serde::{Deserialize, Serialize};

use crate::{
    filter::NodeQueryFilter,
    node::{RegisterNode, ServiceNode},
};

/// 通用应答体：`{result, msg?}`。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultResponse {
    #[serde(default)]
    pub result: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

/// 注册 / 注销请求，内容即服务节点本身。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegisterRequest {
    pub node: ServiceNode,
}

impl From<ServiceNode> for RegisterRequest {
    fn from(node: ServiceNode) -> Self {
        Self { node }
    }
}

/// 拓扑查询请求。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(rename = "from-uid", default, skip_serializing_if = "String::is_empty")]
    pub from_uid: String,
    #[serde(rename = "uid-filter", default, skip_serializing_if = "NodeQueryFilter::is_empty")]
    pub uid_filter: NodeQueryFilter,
    #[serde(rename = "type-filter", default, skip_serializing_if = "NodeQueryFilter::is_empty")]
    pub type_filter: NodeQueryFilter,
}

impl QueryRequest {
    /// 查询除自身以外的全部节点。
    pub fn excluding_self(app_uid: impl Into<String>) -> Self {
        let from_uid = app_uid.into();
        Self {
            uid_filter: NodeQueryFilter::exclude([from_uid.clone()]),
            from_uid,
            type_filter: NodeQueryFilter::pass_all(),
        }
    }
}

/// 拓扑查询应答；`nodes` 缺失与空列表在语义上不同，前者视为命名节点异常。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<RegisterNode>>,
}

/// 探活请求。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingRequest {
    #[serde(rename = "from-node-type", default, skip_serializing_if = "String::is_empty")]
    pub from_node_type: String,
    #[serde(rename = "from-uid", default, skip_serializing_if = "String::is_empty")]
    pub from_uid: String,
    #[serde(rename = "to-uid", default)]
    pub to_uid: String,
}

/// 探活应答：回报本节点 uid。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    #[serde(rename = "from-uid", default)]
    pub response_uid: String,
}

/// 管理事件请求。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEventRequest {
    #[serde(rename = "from-uid", default, skip_serializing_if = "String::is_empty")]
    pub from_uid: String,
    #[serde(rename = "event-id", default)]
    pub event_id: String,
    #[serde(rename = "event-args", default)]
    pub event_args: Vec<String>,
}

/// 管理事件应答。
pub type ServiceEventResponse = DefaultResponse;

/// 命名节点主动推送“拓扑已变化”的通知。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushRequest {
    #[serde(rename = "from-uid", default, skip_serializing_if = "String::is_empty")]
    pub from_uid: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::node::Scheme;

    #[test]
    fn query_excluding_self_encodes_uid_filter_only() {
        let encoded = serde_json::to_value(QueryRequest::excluding_self("worker-1")).expect("encode");
        assert_eq!(
            encoded,
            json!({"from-uid": "worker-1", "uid-filter": {"exclude": ["worker-1"]}})
        );
    }

    #[test]
    fn register_request_is_the_bare_service_node() {
        let request = RegisterRequest::from(ServiceNode::new(
            "worker-1",
            "worker",
            "10.0.0.1:8080",
            Scheme::Http,
        ));
        let encoded = serde_json::to_value(&request).expect("encode");
        assert_eq!(
            encoded,
            json!({"uid": "worker-1", "type": "worker", "api-root": "10.0.0.1:8080", "scheme": "http"})
        );
    }

    #[test]
    fn missing_nodes_is_distinguished_from_empty() {
        let missing: QueryResponse = serde_json::from_str("{}").expect("decode");
        assert!(missing.nodes.is_none());
        let empty: QueryResponse = serde_json::from_str(r#"{"nodes":[]}"#).expect("decode");
        assert_eq!(empty.nodes, Some(Vec::new()));
    }

    #[test]
    fn event_request_uses_kebab_names() {
        let request: ServiceEventRequest =
            serde_json::from_str(r#"{"event-id":"setLogLevel","event-args":["3"]}"#)
                .expect("decode");
        assert_eq!(request.event_id, "setLogLevel");
        assert_eq!(request.event_args, ["3"]);
    }
}
