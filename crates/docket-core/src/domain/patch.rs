//! Patch - ストアが適用する型つき更新
//!
//! 文字列で更新ドキュメントを組み立てる代わりに、操作を列挙型で表す。
//! ストアは 1 回の呼び出しの中で、マッチした各アイテムに順に適用する。

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::changes::{field_order_from, is_reserved};
use super::{AuditRecord, Item, ItemStatus, ReviewerId};

/// 投稿受付が打刻する日付フィールド
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateField {
    Change,
    Init,
}

/// 1 つの更新操作
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOp {
    SetLockHolder(Option<ReviewerId>),
    SetLeaseTimestamp(DateTime<Utc>),
    SetStatus(ItemStatus),
    SetStatusIfMissing(ItemStatus),
    SetNotesIfMissing(String),
    SetUserData(Value),

    /// レビュアーの変更をマージ（status / notes / user_data / field_order は
    /// 名前つきフィールドへ、予約キーは無視、それ以外は `fields` へ）
    MergeFields(Map<String, Value>),

    PushLog(AuditRecord),
    StampDate(DateField, DateTime<Utc>),
}

/// 操作の列。マッチした各アイテムに先頭から順に適用する
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    ops: Vec<PatchOp>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    /// 操作を末尾に追加
    pub fn with(mut self, op: PatchOp) -> Self {
        self.ops.push(op);
        self
    }

    /// `holder` のリースを `at` で打刻
    pub fn lease(self, holder: ReviewerId, at: DateTime<Utc>) -> Self {
        self.with(PatchOp::SetLockHolder(Some(holder)))
            .with(PatchOp::SetLeaseTimestamp(at))
    }

    /// 保持者だけを外す。打刻は残るので、割り当て対象に戻るのはその打刻が
    /// 期限切れになってから
    pub fn release(self) -> Self {
        self.with(PatchOp::SetLockHolder(None))
    }

    /// 適用順の操作一覧
    pub fn ops(&self) -> &[PatchOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// `item` に全操作を順に適用
    pub fn apply(&self, item: &mut Item) {
        for op in &self.ops {
            match op {
                PatchOp::SetLockHolder(holder) => item.lock_holder = holder.clone(),
                PatchOp::SetLeaseTimestamp(at) => item.lease_timestamp = Some(*at),
                PatchOp::SetStatus(status) => item.status = Some(status.clone()),
                PatchOp::SetStatusIfMissing(status) => {
                    item.status.get_or_insert_with(|| status.clone());
                }
                PatchOp::SetNotesIfMissing(notes) => {
                    item.notes.get_or_insert_with(|| notes.clone());
                }
                PatchOp::SetUserData(data) => item.user_data = Some(data.clone()),
                PatchOp::MergeFields(fields) => merge_fields(item, fields),
                PatchOp::PushLog(record) => item.log.push(record.clone()),
                PatchOp::StampDate(DateField::Change, at) => item.change_date = Some(*at),
                PatchOp::StampDate(DateField::Init, at) => item.init_date = Some(*at),
            }
        }
    }
}

fn merge_fields(item: &mut Item, fields: &Map<String, Value>) {
    for (name, value) in fields {
        match name.as_str() {
            "status" => item.status = Some(ItemStatus::from(plain_string(value))),
            "notes" => item.notes = Some(plain_string(value)),
            "user_data" => item.user_data = Some(value.clone()),
            "field_order" => {
                if let Some(order) = field_order_from(value) {
                    item.field_order = order;
                }
            }
            reserved if is_reserved(reserved) => {}
            _ => {
                item.fields.insert(name.clone(), value.clone());
            }
        }
    }
}

fn plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
