//! アイテム自身に積む監査ログのエントリ

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ReviewerId;

/// 受理された変更 1 件（誰が・いつ・何を）
///
/// `Item::log` に追記するだけで書き換えない。並びは追記順。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub holder: ReviewerId,
    pub time: DateTime<Utc>,

    /// 実際に適用した変更（未設定のエントリは除外済み）
    pub changes: Map<String, Value>,
}

impl AuditRecord {
    pub fn new(holder: ReviewerId, time: DateTime<Utc>, changes: Map<String, Value>) -> Self {
        Self {
            holder,
            time,
            changes,
        }
    }
}
