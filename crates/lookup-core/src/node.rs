//! # node 模块说明
//!
//! ## 角色定位（Why）
//! - 定义在命名节点与服务节点之间往返的节点描述：[`ServiceNode`] 是节点自报的身份，
//!   [`RegisterNode`] 在其上追加“由哪个命名节点确认”与创建时间；
//! - 字段的 JSON 名称沿用命名节点既有协议（`api-root`、`served-Lookup-uid` 等），不可随意改名。

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::consts::LOOKUP_NODE_TYPE;

/// 服务类型标识，例如 `lookup`、`worker`。
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeType(String);

impl NodeType {
    /// 以任意字符串构造服务类型。
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// 命名节点类型。
    #[must_use]
    pub fn lookup() -> Self {
        Self(LOOKUP_NODE_TYPE.to_owned())
    }

    /// 是否为命名节点类型。
    #[must_use]
    pub fn is_lookup(&self) -> bool {
        self.0 == LOOKUP_NODE_TYPE
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NodeType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for NodeType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// 访问节点 API 时使用的协议。
///
/// 线路上只有 `"http"` 表示明文，其它取值（包括缺省与空串）一律视为 `https`。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Scheme {
    Http,
    #[default]
    Https,
}

impl Scheme {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl From<String> for Scheme {
    fn from(value: String) -> Self {
        Scheme::from(value.as_str())
    }
}

impl From<&str> for Scheme {
    fn from(value: &str) -> Self {
        if value == "http" {
            Scheme::Http
        } else {
            Scheme::Https
        }
    }
}

impl From<Scheme> for String {
    fn from(value: Scheme) -> Self {
        value.as_str().to_owned()
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 节点自报的服务身份。
///
/// # 契约说明（What）
/// - `uid` 全局唯一，由节点自身生成；
/// - `api_root` 为 `host:port`，与 `scheme` 共同拼出请求 URL；
/// - 仅当 `uid`、`node_type`、`api_root` 三者均非空时视为有效，见 [`ServiceNode::is_valid`]。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceNode {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(rename = "type", default, skip_serializing_if = "NodeType::is_empty")]
    pub node_type: NodeType,
    #[serde(rename = "api-root", default, skip_serializing_if = "String::is_empty")]
    pub api_root: String,
    #[serde(default)]
    pub scheme: Scheme,
}

impl ServiceNode {
    pub fn new(
        uid: impl Into<String>,
        node_type: impl Into<NodeType>,
        api_root: impl Into<String>,
        scheme: Scheme,
    ) -> Self {
        Self {
            uid: uid.into(),
            node_type: node_type.into(),
            api_root: api_root.into(),
            scheme,
        }
    }

    /// 基本有效性校验：uid、类型与 API 根地址均不可为空。
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.uid.is_empty() && !self.node_type.is_empty() && !self.api_root.is_empty()
    }

    /// 拼接目标 URL：`<scheme>://<api-root><path>`。
    #[must_use]
    pub fn join_url(&self, path: &str) -> String {
        format!("{}://{}{}", self.scheme, self.api_root, path)
    }
}

/// 注册表中的一条记录：服务身份 + 确认该注册的命名节点 + 创建时间。
///
/// # 教案式说明
/// - **标识（What）**：注册表以 `uid` 为键，同一 uid 至多一条记录；
/// - **拓扑比较（How）**：刷新时以 `(uid, served_by_uid)` 二元组判断记录是否仍被命名节点报告，
///   因此同一节点若换由其它命名节点确认，也会被视作新的拓扑事实。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterNode {
    #[serde(flatten)]
    pub node: ServiceNode,
    #[serde(
        rename = "served-Lookup-uid",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub served_by_uid: String,
    #[serde(rename = "create-time", default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
}

impl RegisterNode {
    /// 以服务身份构造尚未被任何命名节点确认的记录。
    #[must_use]
    pub fn from_service(node: ServiceNode) -> Self {
        Self {
            node,
            served_by_uid: String::new(),
            create_time: None,
        }
    }

    #[must_use]
    pub fn served_by(mut self, lookup_uid: impl Into<String>) -> Self {
        self.served_by_uid = lookup_uid.into();
        self
    }

    #[must_use]
    pub fn uid(&self) -> &str {
        &self.node.uid
    }

    #[must_use]
    pub fn node_type(&self) -> &NodeType {
        &self.node.node_type
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.node.is_valid()
    }

    #[must_use]
    pub fn join_url(&self, path: &str) -> String {
        self.node.join_url(path)
    }

    /// 拓扑比较所用的二元组。
    #[must_use]
    pub fn topology_key(&self) -> (&str, &str) {
        (&self.node.uid, &self.served_by_uid)
    }
}
