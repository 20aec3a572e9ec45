//! リース延長のカスケード
//!
//! バッチ内のどれか 1 件を編集すると、そのレビュアーが有効なリースで
//! 保持している全アイテムを同じ時刻で打刻し直す。

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::{DocketError, LeaseTimeout, Patch, PatchOp, Predicate, ReviewerId};
use crate::ports::ItemStore;

/// `reviewer` が保持する有効なリースをすべて `as_of` で打刻し直す
///
/// 期限切れのリースには触れない。戻り値は延長した件数。
pub async fn renew_holder_leases(
    store: &dyn ItemStore,
    reviewer: &ReviewerId,
    as_of: DateTime<Utc>,
    timeout: LeaseTimeout,
) -> Result<usize, DocketError> {
    let held = Predicate::LeaseHeld {
        holder: reviewer.clone(),
        since: timeout.cutoff(as_of),
    };
    let patch = Patch::new().with(PatchOp::SetLeaseTimestamp(as_of));
    let renewed = store.update_many(&held, &patch).await?;
    debug!(%reviewer, renewed, "renewed leases");
    Ok(renewed)
}
