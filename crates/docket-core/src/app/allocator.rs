//! Allocator - レビュアーへのバッチ割り当て
//!
//! # フロー
//! 1. Continue: 自分が保持中（リース有効）のアイテムを最大 batch_size 件
//!    → なければ、リース切れ・未リースのアイテムを最大 batch_size 件
//! 2. Advance: 自分の保持を全部解除してから、リース切れ・未リースを選ぶ
//! 3. 選んだアイテムに `lock_holder = reviewer`, `lease_timestamp = now` を一括で打刻
//!
//! # 既知のレース
//! 選択（find）と打刻（update_many）は別呼び出しでトランザクションはない。
//! 2 人の allocate の読み取りが交錯すると同じアイテムが両方に渡り得る。
//! これは許容しているベストエフォートの性質で、エラーとしては返さない。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{DocketError, Item, LeaseTimeout, Patch, Predicate, ReviewerId};
use crate::ports::ItemStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMode {
    /// 保持中のバッチを続ける。なければ新しく割り当てる
    #[default]
    Continue,

    /// 今のバッチを手放して次を取る
    Advance,
}

pub async fn allocate(
    store: &dyn ItemStore,
    reviewer: &ReviewerId,
    batch_size: usize,
    timeout: LeaseTimeout,
    mode: AllocationMode,
    now: DateTime<Utc>,
) -> Result<Vec<Item>, DocketError> {
    if batch_size == 0 {
        return Ok(Vec::new());
    }
    let since = timeout.cutoff(now);
    let free = Predicate::LeaseFree { since };

    let selected = match mode {
        AllocationMode::Advance => {
            let released = store
                .update_many(&Predicate::LockHeldBy(reviewer.clone()), &Patch::new().release())
                .await?;
            debug!(%reviewer, released, "released previous batch");
            store.find(&free, Some(batch_size)).await?
        }
        AllocationMode::Continue => {
            let held = Predicate::LeaseHeld {
                holder: reviewer.clone(),
                since,
            };
            let current = store.find(&held, Some(batch_size)).await?;
            if current.is_empty() {
                store.find(&free, Some(batch_size)).await?
            } else {
                current
            }
        }
    };

    let stamped = stamp(store, selected, reviewer, now).await?;
    info!(%reviewer, ?mode, count = stamped.len(), "allocated batch");
    Ok(stamped)
}

async fn stamp(
    store: &dyn ItemStore,
    mut selected: Vec<Item>,
    reviewer: &ReviewerId,
    now: DateTime<Utc>,
) -> Result<Vec<Item>, DocketError> {
    if selected.is_empty() {
        return Ok(selected);
    }
    let patch = Patch::new().lease(reviewer.clone(), now);
    let ids = selected.iter().map(|item| item.id).collect();
    store.update_many(&Predicate::IdIn(ids), &patch).await?;

    for item in &mut selected {
        patch.apply(item);
    }
    Ok(selected)
}
