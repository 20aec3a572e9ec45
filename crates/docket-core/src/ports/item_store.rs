//! ItemStore port - 共有ドキュメントコレクションへの薄いインターフェース
//!
//! ItemStore は以下を提供します：
//! - filtered find / count
//! - bulk update-many
//! - atomic find-and-update（単一ドキュメント、upsert あり）
//! - insert / distinct
//!
//! # 実装
//! - **InMemoryItemStore**（`impls::inmem_store`）: 開発・テスト用
//! - 本番のドキュメントストアは別クレートで実装する想定

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{Item, ItemId, NewItem, Patch, Predicate};

/// ストア操作のエラー
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// 同じ ID のアイテムがすでにある
    #[error("duplicate item id: {0}")]
    DuplicateId(ItemId),
}

/// ItemStore はアイテムの正本（source of truth）
///
/// # 設計原則
/// - 共有される可変リソースはここだけ。プロセス内ロックは持たない
/// - 1 回の呼び出しは 1 ドキュメント単位で原子的。複数呼び出しを跨ぐ
///   トランザクションはない（allocate の read → stamp は非原子）
/// - 並び順は「ストアのデフォルト順」= 挿入順
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// `filter` にマッチするアイテムをストア順に最大 `limit` 件
    async fn find(
        &self,
        filter: &Predicate,
        limit: Option<usize>,
    ) -> Result<Vec<Item>, StoreError>;

    /// 最初にマッチした 1 件
    async fn find_one(&self, filter: &Predicate) -> Result<Option<Item>, StoreError> {
        Ok(self.find(filter, Some(1)).await?.into_iter().next())
    }

    /// マッチ件数
    async fn count(&self, filter: &Predicate) -> Result<usize, StoreError>;

    /// マッチした全件に `patch` を適用し、適用件数を返す
    async fn update_many(&self, filter: &Predicate, patch: &Patch) -> Result<usize, StoreError>;

    /// 最初にマッチした 1 件に `patch` を適用し、更新後の値を返す（原子的）
    ///
    /// `upsert` のときはマッチがなければ新規作成してから適用する
    /// （フィルタが ID を 1 つだけ指定していればその ID を使う）。
    async fn find_one_and_update(
        &self,
        filter: &Predicate,
        patch: &Patch,
        upsert: bool,
    ) -> Result<Option<Item>, StoreError>;

    /// 新規アイテムを挿入し、採番した ID を返す
    async fn insert_one(&self, item: NewItem) -> Result<ItemId, StoreError>;

    /// `path` の値の重複なし一覧。配列は要素ごとに数える
    async fn distinct(&self, path: &str) -> Result<Vec<Value>, StoreError>;
}
