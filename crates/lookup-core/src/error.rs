//! # error 模块说明
//!
//! 核心层几乎不产生错误：注册表与负载均衡器的操作都是全函数。这里只收纳节点标识
//! 生成与解析相关的失败，供上层决定是否回退到随机标识。

use thiserror::Error;

/// 节点标识（uid）相关错误。
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum UidError {
    /// 系统时钟早于 UNIX 纪元，无法生成时间有序标识。
    #[error("system clock is before the unix epoch, time-ordered uid unavailable")]
    ClockBeforeEpoch,

    /// 字符串无法解析为 UUID。
    #[error("uid `{uid}` is not a well-formed uuid: {detail}")]
    Malformed { uid: String, detail: String },

    /// UUID 版本不携带时间戳（例如随机生成的 v4 回退标识）。
    #[error("uid `{uid}` does not carry a timestamp")]
    NotTimeOrdered { uid: String },
}
