//! SubmissionLog port - 外部からの投稿を追記するサイドチャネル
//!
//! # 実装
//! - **JsonlSubmissionLog**（`impls::jsonl_log`）: 1 行 1 JSON で追記
//! - **NoopSubmissionLog**: 設定がない場合。何もしない

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::ItemId;

/// 投稿ログの 1 行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionEntry {
    pub item_id: ItemId,
    pub time: DateTime<Utc>,
    pub user_data: Value,
}

/// 投稿の追記先（失敗は呼び出し側で警告に留める）
#[async_trait]
pub trait SubmissionLog: Send + Sync {
    async fn append(&self, entry: &SubmissionEntry) -> std::io::Result<()>;
}

/// 何も書かない投稿ログ（`submission_log` 未設定時の既定）
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSubmissionLog;

#[async_trait]
impl SubmissionLog for NoopSubmissionLog {
    async fn append(&self, _entry: &SubmissionEntry) -> std::io::Result<()> {
        Ok(())
    }
}
