//! Intake - 外部（レビュアー以外）からの投稿受付
//!
//! # フロー
//! 1. `new` なら user_data だけを持つアイテムを作る。既存 ID なら user_data と
//!    status を置き換える（ID がなければ NotFound）
//! 2. 呼び出し前に user_data がなかったら `init_date`、あったら `change_date` を打刻
//! 3. 投稿ログに 1 行追記
//!
//! リースプロトコルには参加しない。
//! 投稿ログの失敗は `warn!` だけ出して ID を返す。アイテムはもう保存済みで、
//! エラーにすると `new` の再送が重複アイテムを作ってしまうため。

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, warn};

use crate::domain::{
    DateField, DocketError, InvalidItemId, ItemId, ItemStatus, NewItem, Patch, PatchOp, Predicate,
};
use crate::ports::{ItemStore, SubmissionEntry, SubmissionLog};

/// 投稿先
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionTarget {
    /// 新規作成（境界では文字列 `"new"`）
    New,
    /// 既存アイテムの user_data を置き換える
    Existing(ItemId),
}

impl FromStr for SubmissionTarget {
    type Err = InvalidItemId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(SubmissionTarget::New),
            id => id.parse().map(SubmissionTarget::Existing),
        }
    }
}

impl fmt::Display for SubmissionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionTarget::New => f.write_str("new"),
            SubmissionTarget::Existing(id) => write!(f, "{id}"),
        }
    }
}

/// `user_data` を受け付けて、保存先アイテムの ID を返す
pub async fn submit(
    store: &dyn ItemStore,
    log: &dyn SubmissionLog,
    target: SubmissionTarget,
    user_data: Value,
    new_status: ItemStatus,
    now: DateTime<Utc>,
) -> Result<ItemId, DocketError> {
    let (item_id, had_user_data) = match target {
        SubmissionTarget::New => {
            let draft = NewItem {
                status: Some(new_status),
                user_data: Some(user_data.clone()),
                ..NewItem::default()
            };
            (store.insert_one(draft).await?, false)
        }
        SubmissionTarget::Existing(id) => {
            let by_id = Predicate::id(id);
            let before = store
                .find_one(&by_id)
                .await?
                .ok_or(DocketError::NotFound(id))?;
            let patch = Patch::new()
                .with(PatchOp::SetUserData(user_data.clone()))
                .with(PatchOp::SetStatus(new_status));
            store.update_many(&by_id, &patch).await?;
            (id, before.user_data.is_some())
        }
    };

    let date = if had_user_data {
        DateField::Change
    } else {
        DateField::Init
    };
    store
        .find_one_and_update(
            &Predicate::id(item_id),
            &Patch::new().with(PatchOp::StampDate(date, now)),
            true,
        )
        .await?;

    let entry = SubmissionEntry {
        item_id,
        time: now,
        user_data,
    };
    if let Err(err) = log.append(&entry).await {
        warn!(%item_id, error = %err, "submission stored but not written to the submission log");
    }

    info!(%item_id, %target, ?date, "accepted submission");
    Ok(item_id)
}
