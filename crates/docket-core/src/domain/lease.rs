//! リースの判定
//!
//! リースはアイテム上の (`lock_holder`, `lease_timestamp`) の組。
//! 打刻がタイムアウトより古ければ、`lock_holder` が残っていてもリースなしとして扱う。

use chrono::{DateTime, Duration, Utc};

use super::{Item, ReviewerId};

/// 最後の打刻からリースが有効な期間（正の値のみ）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseTimeout(Duration);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("lease timeout must be positive")]
pub struct InvalidLeaseTimeout;

impl LeaseTimeout {
    pub fn from_minutes(minutes: u32) -> Result<Self, InvalidLeaseTimeout> {
        Self::from_duration(Duration::minutes(i64::from(minutes)))
    }

    pub fn from_duration(duration: Duration) -> Result<Self, InvalidLeaseTimeout> {
        if duration <= Duration::zero() {
            return Err(InvalidLeaseTimeout);
        }
        Ok(Self(duration))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    /// `now` 時点で有効とみなす最も古い打刻（この時刻を含む）
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.0
    }
}

/// `item` のリースが `now` 時点で有効か
///
/// `holder` を指定した場合は、そのレビュアーが保持していることも条件。
pub fn is_lease_valid(
    item: &Item,
    holder: Option<&ReviewerId>,
    timeout: LeaseTimeout,
    now: DateTime<Utc>,
) -> bool {
    let Some(stamped) = item.lease_timestamp else {
        return false;
    };
    if stamped < timeout.cutoff(now) {
        return false;
    }
    match holder {
        Some(holder) => item.lock_holder.as_ref() == Some(holder),
        None => true,
    }
}
