#![deny(unsafe_code)]

//! # lookup-core
//!
//! ## 定位与职责（Why）
//! - 为舰队内每个进程提供“自注册 + 对端发现”所需的共享数据模型：服务节点、注册记录、
//!   查询过滤器以及线路协议结构体；
//! - 提供并发安全的节点注册表 [`NodeRegistry`] 与按服务类型轮询的 [`LoadBalancer`]，
//!   供 `lookup-client` 的刷新循环与请求分发复用。
//!
//! ## 架构嵌入（Where）
//! - `node`、`filter`、`rpc` 描述线路上的 JSON 形态，字段命名与命名节点（lookup node）保持一致；
//! - `registry` 与 `balancer` 是纯内存结构，不执行任何 I/O；
//! - `uid` 负责生成时间有序的节点标识。
//!
//! ## 约束（What）
//! - 所有读操作均返回按 uid 升序排列的序列，保证故障转移顺序可复现；
//! - 注册表不提供跨节点一致性保证，它只是本地独立刷新的最终一致快照。

pub mod balancer;
pub mod consts;
pub mod error;
pub mod filter;
pub mod node;
pub mod registry;
pub mod rpc;
pub mod uid;

pub use balancer::LoadBalancer;
pub use error::UidError;
pub use filter::NodeQueryFilter;
pub use node::{NodeType, RegisterNode, Scheme, ServiceNode};
pub use registry::NodeRegistry;
