//! Errors - コアのエラー型
//!
//! # 分類
//! - NotFound / LeaseDenied: 呼び出し側で区別できること（「消えた」と「他の人がレビュー中」）
//! - MalformedFilter: 呼び出し側のクエリが不正（ストアアダプタから伝播、回復しない）
//! - ReservedField / InvalidFieldValue: 更新内容が不正（書き込み前に弾く）
//! - Store: インフラ側の失敗
//!
//! 投稿ログの書き込み失敗はエラーにしない（アイテムはもう保存済みなので、
//! `warn!` を出して ID を返す）。
//!
//! リトライはしない。必要なら呼び出し側の判断。

use thiserror::Error;

use super::{InvalidItemId, ItemId, QueryError, ReviewerId};
use crate::ports::StoreError;

/// コア操作が返すエラー
#[derive(Debug, Error)]
pub enum DocketError {
    #[error("item not found: {0}")]
    NotFound(ItemId),

    #[error("{holder} does not hold a live lease on {item}")]
    LeaseDenied { item: ItemId, holder: ReviewerId },

    #[error("malformed filter: {0}")]
    MalformedFilter(#[from] QueryError),

    #[error("field {0:?} is managed by the store and cannot be updated")]
    ReservedField(String),

    #[error("field {field:?} must be {expected}")]
    InvalidFieldValue { field: String, expected: &'static str },

    #[error(transparent)]
    InvalidItemId(#[from] InvalidItemId),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl DocketError {
    /// 「他の人がレビュー中（またはリース切れ）」か
    pub fn is_lease_denied(&self) -> bool {
        matches!(self, DocketError::LeaseDenied { .. })
    }

    /// 「アイテムが存在しない」か
    pub fn is_not_found(&self) -> bool {
        matches!(self, DocketError::NotFound(_))
    }
}
