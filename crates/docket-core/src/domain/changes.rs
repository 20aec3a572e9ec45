//! FieldChanges - レビュアーが送ってくる部分更新
//!
//! # 予約フィールド
//! ストア・リース・投稿受付が管理するキー（`_id`, `lock_holder`,
//! `lease_timestamp`, `log`, `change_date`, `init_date`）はレビュアーの
//! 更新から書き込めない。
//!
//! # 型つきフィールド
//! `field_order` は文字列の配列でなければならない（[`field_order_from`]）。

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// ストアとリースプロトコルが所有するキー
pub const RESERVED_FIELDS: &[&str] = &[
    "_id",
    "lock_holder",
    "lease_timestamp",
    "log",
    "change_date",
    "init_date",
];

/// `field` が予約フィールドかどうか
pub fn is_reserved(field: &str) -> bool {
    RESERVED_FIELDS.contains(&field)
}

/// `field_order` の値を文字列リストとして読む。配列以外・文字列以外の要素があれば `None`
pub fn field_order_from(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|name| name.as_str().map(str::to_string))
        .collect()
}

/// 1 フィールド分の変更要求
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 現状のまま（JSON の `null`）
    Unset,
    Set(Value),
}

/// フィールド名をキーにした変更要求の集合
///
/// JSON 境界では `null` が [`FieldValue::Unset`] を意味する。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldChanges {
    entries: BTreeMap<String, FieldValue>,
}

impl FieldChanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// `field` を `value` に書き換える要求を追加
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries
            .insert(field.into(), FieldValue::Set(value.into()));
        self
    }

    /// `field` は触らない（明示的な Unset）
    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.entries.insert(field.into(), FieldValue::Unset);
        self
    }

    /// Unset を含む要求数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unset を落として、実際に書き込む分だけを返す
    pub fn into_effective(self) -> Map<String, Value> {
        self.entries
            .into_iter()
            .filter_map(|(field, value)| match value {
                FieldValue::Set(v) => Some((field, v)),
                FieldValue::Unset => None,
            })
            .collect()
    }
}

impl From<Map<String, Value>> for FieldChanges {
    fn from(object: Map<String, Value>) -> Self {
        let entries = object
            .into_iter()
            .map(|(field, value)| {
                let value = match value {
                    Value::Null => FieldValue::Unset,
                    v => FieldValue::Set(v),
                };
                (field, value)
            })
            .collect();
        Self { entries }
    }
}
