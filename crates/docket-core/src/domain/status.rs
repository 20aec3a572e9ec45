//! アイテムのワークフロー状態

use serde::{Deserialize, Serialize};
use std::fmt;

/// ワークフロー状態
///
/// 既知の状態は専用のバリアント。それ以外の値は `Other` にそのまま保持する。
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ItemStatus {
    /// 未着手
    #[default]
    Triage,

    /// 外部からの投稿で書き込まれた
    UserSubmitted,

    Other(String),
}

impl ItemStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ItemStatus::Triage => "triage",
            ItemStatus::UserSubmitted => "user-submitted",
            ItemStatus::Other(s) => s,
        }
    }
}

impl From<String> for ItemStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "triage" => ItemStatus::Triage,
            "user-submitted" => ItemStatus::UserSubmitted,
            _ => ItemStatus::Other(s),
        }
    }
}

impl From<&str> for ItemStatus {
    fn from(s: &str) -> Self {
        ItemStatus::from(s.to_string())
    }
}

impl From<ItemStatus> for String {
    fn from(status: ItemStatus) -> Self {
        match status {
            ItemStatus::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
