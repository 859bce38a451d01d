//! 节点标识生成。
//!
//! 首选时间有序的 UUIDv7（字典序即创建顺序，便于日志与注册表按时间排查）；
//! 当系统时钟不可用时回退到随机 UUIDv4。

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::{NoContext, Timestamp, Uuid};

use crate::error::UidError;

/// UUID 文本形式的固定长度。
const UUID_TEXT_LEN: usize = 36;

/// 生成一个新的唯一标识，时间有序优先。
#[must_use]
pub fn generate_uid() -> String {
    match time_ordered_uid() {
        Ok(uid) => uid,
        Err(err) => {
            warn!(error = %err, "falling back to random uuid");
            Uuid::new_v4().to_string()
        }
    }
}

/// 生成时间有序的 UUIDv7 文本。
pub fn time_ordered_uid() -> Result<String, UidError> {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| UidError::ClockBeforeEpoch)?;
    let ts = Timestamp::from_unix(
        NoContext,
        since_epoch.as_secs(),
        since_epoch.subsec_nanos(),
    );
    Ok(Uuid::new_v7(ts).to_string())
}

/// 以服务类型为前缀生成节点 uid：`<node_type>-<uuid>`。
#[must_use]
pub fn node_uid(node_type: &str) -> String {
    format!("{node_type}-{}", generate_uid())
}

/// 从 uid 中还原创建时间。
///
/// 接受裸 UUID 或带 `<node_type>-` 前缀的节点 uid；只有时间有序的版本才能还原。
pub fn timestamp_from_uid(uid: &str) -> Result<DateTime<Utc>, UidError> {
    let tail = uid
        .len()
        .checked_sub(UUID_TEXT_LEN)
        .and_then(|start| uid.get(start..))
        .unwrap_or(uid);
    let parsed = Uuid::parse_str(tail).map_err(|err| UidError::Malformed {
        uid: uid.to_owned(),
        detail: err.to_string(),
    })?;
    let (secs, nanos) = parsed
        .get_timestamp()
        .ok_or_else(|| UidError::NotTimeOrdered {
            uid: uid.to_owned(),
        })?
        .to_unix();
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, nanos))
        .ok_or_else(|| UidError::Malformed {
            uid: uid.to_owned(),
            detail: "timestamp out of range".to_owned(),
        })
}
