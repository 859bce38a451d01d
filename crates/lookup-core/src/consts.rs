//! 命名节点协议使用的固定常量。

/// 由配置合成的静态命名节点 uid 前缀，带此前缀的记录不会因请求失败被剔除。
pub const STATIC_LOOKUP_UID_PREFIX: &str = "static_args_lookup_uid_";

/// 命名节点自身的服务类型。
pub const LOOKUP_NODE_TYPE: &str = "lookup";

/// 管理面：探活路径。
pub const PING_PATH: &str = "/ping";

/// 管理面：服务事件路径。
pub const EVENT_REQUEST_PATH: &str = "/service-node/event-request";

/// 命名节点 API 根路径。
pub const LOOKUP_API_ROOT: &str = "/lookup/api/v1";

/// 注册路径。
pub const LOOKUP_REGISTER_PATH: &str = "/lookup/api/v1/register";

/// 注销路径。
pub const LOOKUP_DEREGISTER_PATH: &str = "/lookup/api/v1/deregister";

/// 拓扑查询路径。
pub const LOOKUP_QUERY_PATH: &str = "/lookup/api/v1/query";

/// 判断 uid 是否属于静态命名节点。
#[must_use]
pub fn is_static_lookup_uid(uid: &str) -> bool {
    uid.starts_with(STATIC_LOOKUP_UID_PREFIX)
}
