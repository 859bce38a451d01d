//! # admin 模块说明
//!
//! ## 设计定位（Why）
//! - 命名节点与运维工具通过两个固定路径访问服务节点：探活（[`PING_PATH`]）与管理事件
//!   （[`EVENT_REQUEST_PATH`]）；
//! - 处理逻辑写成与 HTTP 框架无关的 `(method, body) -> AdminResponse` 函数，便于直接单测，
//!   [`admin_router`] 只负责把它们挂到 axum 上。
//!
//! ## 契约边界（What）
//! - 两个路径都只接受 `POST`，其它方法返回 `405`；
//! - 请求体无法解析时返回 `400` 且不触发任何回调；
//! - 探活的 `to-uid` 与本节点不符时返回 `404`。

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::any,
};
use bytes::Bytes;
use lookup_core::{
    consts::{EVENT_REQUEST_PATH, PING_PATH},
    rpc::{PingRequest, PingResponse, ServiceEventRequest, ServiceEventResponse},
};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::client::DiscoveryClient;

/// 管理面处理结果：状态码加可选 JSON 应答体。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdminResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl AdminResponse {
    fn empty(status: StatusCode) -> Self {
        Self {
            status,
            body: Bytes::new(),
        }
    }

    /// 序列化失败时退化为 `null`，状态码保持不变。
    fn json<T: Serialize>(status: StatusCode, payload: &T) -> Self {
        let body = match serde_json::to_vec(payload) {
            Ok(body) => Bytes::from(body),
            Err(err) => {
                error!(error = %err, "failed to encode admin response");
                Bytes::from_static(b"null")
            }
        };
        Self { status, body }
    }
}

impl IntoResponse for AdminResponse {
    fn into_response(self) -> Response {
        let has_body = !self.body.is_empty();
        let mut response = (self.status, self.body).into_response();
        if has_body {
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        response
    }
}

impl DiscoveryClient {
    /// 探活：确认请求确实发给本节点，并回报本节点 uid。
    pub fn handle_ping(&self, method: &Method, body: &[u8]) -> AdminResponse {
        if method != Method::POST {
            return AdminResponse::empty(StatusCode::METHOD_NOT_ALLOWED);
        }
        let request: PingRequest = match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(err) => {
                debug!(error = %err, "malformed ping request");
                return AdminResponse::empty(StatusCode::BAD_REQUEST);
            }
        };
        if request.to_uid != self.app_uid() {
            debug!(to_uid = %request.to_uid, from_uid = %request.from_uid, "ping addressed to another node");
            return AdminResponse::empty(StatusCode::NOT_FOUND);
        }
        AdminResponse::json(
            StatusCode::OK,
            &PingResponse {
                response_uid: self.app_uid().to_owned(),
            },
        )
    }

    /// 管理事件：解析事件 id 与参数后交给 [`EventHookRegistry`](crate::EventHookRegistry) 派发。
    pub fn handle_service_event(&self, method: &Method, body: &[u8]) -> AdminResponse {
        if method != Method::POST {
            return AdminResponse::empty(StatusCode::METHOD_NOT_ALLOWED);
        }
        let request: ServiceEventRequest = match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(err) => {
                error!(error = %err, "malformed service event request");
                return AdminResponse::empty(StatusCode::BAD_REQUEST);
            }
        };
        info!(
            event_id = %request.event_id,
            from_uid = %request.from_uid,
            args = ?request.event_args,
            "service event received"
        );
        let result = self.events().dispatch(&request.event_id, &request.event_args);
        AdminResponse::json(
            StatusCode::OK,
            &ServiceEventResponse { result, msg: None },
        )
    }
}

/// 构造挂载两个管理路径的 axum 路由。
pub fn admin_router(client: Arc<DiscoveryClient>) -> Router {
    Router::new()
        .route(PING_PATH, any(ping))
        .route(EVENT_REQUEST_PATH, any(service_event))
        .with_state(client)
}

async fn ping(
    State(client): State<Arc<DiscoveryClient>>,
    method: Method,
    body: Bytes,
) -> AdminResponse {
    client.handle_ping(&method, &body)
}

async fn service_event(
    State(client): State<Arc<DiscoveryClient>>,
    method: Method,
    body: Bytes,
) -> AdminResponse {
    client.handle_service_event(&method, &body)
}
