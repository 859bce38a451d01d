#![deny(unsafe_code)]

//! # lookup-client
//!
//! ## 定位与职责（Why）
//! - 驱动本节点在命名节点上的注册、心跳与注销；
//! - 周期性地从命名节点拉取集群拓扑，维护本地 [`NodeRegistry`](lookup_core::NodeRegistry)；
//! - 按服务类型做轮询负载均衡与失败转移，并在失败时剔除不可达对端；
//! - 暴露 `ping` 与 `service-event` 两个管理面处理器。
//!
//! ## 架构嵌入（Where）
//! - `transport`：发送 JSON 的窄接口 [`Transport`]，默认实现基于 `reqwest`；
//! - `hooks`：管理事件的多订阅者回调表；
//! - `client`：刷新循环与分发算法；
//! - `admin`：与 HTTP 框架无关的管理面处理函数及其 axum 适配。
//!
//! ## 协作约定（What）
//! - 关闭信号以 [`tokio_util::sync::CancellationToken`] 注入，客户端本身不感知进程退出细节；
//! - 所有共享对象（注册表、负载均衡器、事件表）均由调用方显式构造后以 `Arc` 传入。

pub mod admin;
pub mod client;
pub mod error;
pub mod hooks;
pub mod transport;

pub use admin::{AdminResponse, admin_router};
pub use client::{DiscoveryClient, DiscoverySettings, RefreshSummary};
pub use error::{DiscoveryError, TransportError};
pub use hooks::{EventHookRegistry, SysEventId};
pub use transport::{HttpTransport, Transport, TransportResponse, TransportSettings};
