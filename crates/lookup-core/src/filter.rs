use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// 包含/排除谓词，用于从注册表中挑选子集。
///
/// # 教案式说明
/// - **判定规则（How）**：见 [`NodeQueryFilter::kill`]。`exclude` 非空时具有绝对优先级，
///   此时 `include` 被完全忽略；
/// - **使用约定（What）**：每个调用点通常只填充其中一个集合；两者同时非空时以 `exclude` 为准；
/// - **线路形态**：`{"exclude": [...], "include": [...]}`，空集合不序列化。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeQueryFilter {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub exclude: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub include: BTreeSet<String>,
}

impl NodeQueryFilter {
    /// 不过滤任何名称。
    #[must_use]
    pub fn pass_all() -> Self {
        Self::default()
    }

    /// 仅保留给定名称。
    pub fn include<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exclude: BTreeSet::new(),
            include: names.into_iter().map(Into::into).collect(),
        }
    }

    /// 剔除给定名称。
    pub fn exclude<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exclude: names.into_iter().map(Into::into).collect(),
            include: BTreeSet::new(),
        }
    }

    /// 返回 `true` 表示该名称应被过滤掉。
    ///
    /// - `exclude` 非空：当且仅当 `name ∈ exclude` 时过滤；
    /// - 否则 `include` 非空：当且仅当 `name ∉ include` 时过滤；
    /// - 两者皆空：从不过滤。
    #[must_use]
    pub fn kill(&self, name: &str) -> bool {
        if !self.exclude.is_empty() {
            return self.exclude.contains(name);
        }
        if !self.include.is_empty() {
            return !self.include.contains(name);
        }
        false
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exclude.is_empty() && self.include.is_empty()
    }
}
