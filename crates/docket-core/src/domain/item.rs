//! Item - レビュー単位ごとの 1 ドキュメント
//!
//! # リースの表現
//! - 別テーブルは持たず、業務データの横に `lock_holder` と `lease_timestamp`
//!   の 2 フィールドとして埋め込む
//! - `lock_holder` の空文字は「保持者なし」として読む
//!
//! # フィールドの置き場所
//! 名前つきフィールド（status, notes, user_data, field_order, 日付, log）以外は
//! すべて `fields` に入り、シリアライズ時にトップレベルへ展開される。
//! 同じキーが両方に入らないよう、予約キーは `fields` に入れない。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::changes::is_reserved;
use super::{AuditRecord, ItemId, ItemStatus, ReviewerId};

/// コレクションに保存されているレビュー対象アイテム
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "_id")]
    pub id: ItemId,

    /// 起動時のバックフィルまでは未設定のことがある。読むときは [`Item::status`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ItemStatus>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_holder_as_none"
    )]
    pub lock_holder: Option<ReviewerId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub log: Vec<AuditRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_order: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_date: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_date: Option<DateTime<Utc>>,

    /// その他の業務フィールド（トップレベルに展開）
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// ID 採番前のドキュメント（シード投入・投稿受付）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ItemStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_order: Vec<String>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Item {
    /// 下書きから Item を作る。リースと log は空、予約キーは `fields` から捨てる
    pub fn new(id: ItemId, draft: NewItem) -> Self {
        let mut fields = draft.fields;
        fields.retain(|name, _| !is_reserved(name));
        Self {
            id,
            status: draft.status,
            lock_holder: None,
            lease_timestamp: None,
            log: Vec::new(),
            user_data: draft.user_data,
            notes: draft.notes,
            field_order: draft.field_order,
            change_date: None,
            init_date: None,
            fields,
        }
    }

    /// ステータス。未設定なら triage
    pub fn status(&self) -> ItemStatus {
        self.status.clone().unwrap_or_default()
    }

    /// メモ。未設定なら空文字
    pub fn notes(&self) -> &str {
        self.notes.as_deref().unwrap_or("")
    }

    /// 現在の保持者（リースが有効かどうかは見ない）
    pub fn holder(&self) -> Option<&ReviewerId> {
        self.lock_holder.as_ref()
    }

    /// JSON ドキュメントとしての Item。述語はこの形に対して評価する
    pub fn to_document(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// ドット区切りのパス（`user_data.title`, `authors.1`）をたどる
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn empty_holder_as_none<'de, D>(deserializer: D) -> Result<Option<ReviewerId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(ReviewerId::new))
}
