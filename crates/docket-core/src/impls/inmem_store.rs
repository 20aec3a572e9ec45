//! InMemoryItemStore - 開発・テスト用のドキュメントストア
//!
//! # 実装詳細
//! - HashMap<ItemId, Item> を正本、Vec<ItemId> で挿入順を保持
//! - tokio の Mutex で排他制御。各メソッドはロック内で完結し、await を跨がない
//! - find → update の間はロックを手放すので、呼び出し側から見た原子性は
//!   1 メソッド単位（実ストアと同じ）

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::domain::item::lookup;
use crate::domain::{Item, ItemId, NewItem, Patch, Predicate};
use crate::ports::{IdGenerator, ItemStore, StoreError, SystemClock, UlidGenerator};

struct InMemoryItemStoreState {
    /// 全アイテム（唯一の正）
    items: HashMap<ItemId, Item>,

    /// 挿入順（`find` の既定の並び）
    order: Vec<ItemId>,
}

impl InMemoryItemStoreState {
    fn new() -> Self {
        Self {
            items: HashMap::new(),
            order: Vec::new(),
        }
    }

    fn matching<'a>(&'a self, filter: &'a Predicate) -> impl Iterator<Item = ItemId> + 'a {
        self.order
            .iter()
            .copied()
            .filter(move |id| self.items.get(id).is_some_and(|item| filter.matches(item)))
    }

    fn insert(&mut self, item: Item) -> Result<ItemId, StoreError> {
        let id = item.id;
        if self.items.contains_key(&id) {
            return Err(StoreError::DuplicateId(id));
        }
        self.items.insert(id, item);
        self.order.push(id);
        Ok(id)
    }

    /// `path` の値。配列は展開し、欠けたフィールドは飛ばす
    fn unwound_values(&self, path: &str) -> Vec<Value> {
        let mut values = Vec::new();
        for id in &self.order {
            let Some(item) = self.items.get(id) else {
                continue;
            };
            let doc = item.to_document();
            match lookup(&doc, path) {
                Some(Value::Array(elements)) => values.extend(elements.iter().cloned()),
                Some(value) => values.push(value.clone()),
                None => {}
            }
        }
        values
    }
}

/// [`ItemStore`] のインメモリ実装
pub struct InMemoryItemStore {
    state: Arc<Mutex<InMemoryItemStoreState>>,
    ids: Arc<dyn IdGenerator>,
}

impl InMemoryItemStore {
    pub fn new(ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            state: Arc::new(Mutex::new(InMemoryItemStoreState::new())),
            ids,
        }
    }

    /// システム時計由来の ULID を採番するストア
    pub fn with_system_ids() -> Self {
        Self::new(Arc::new(UlidGenerator::new(SystemClock)))
    }

    /// 完全なドキュメントを戻す（ID・リース・ログはそのまま）
    pub async fn restore(&self, item: Item) -> Result<ItemId, StoreError> {
        self.state.lock().await.insert(item)
    }

    /// ストア順の全アイテム
    pub async fn snapshot(&self) -> Vec<Item> {
        let state = self.state.lock().await;
        state
            .order
            .iter()
            .filter_map(|id| state.items.get(id).cloned())
            .collect()
    }
}

#[async_trait]
impl ItemStore for InMemoryItemStore {
    async fn find(
        &self,
        filter: &Predicate,
        limit: Option<usize>,
    ) -> Result<Vec<Item>, StoreError> {
        let state = self.state.lock().await;
        let found = state
            .matching(filter)
            .take(limit.unwrap_or(usize::MAX))
            .filter_map(|id| state.items.get(&id).cloned())
            .collect();
        Ok(found)
    }

    async fn count(&self, filter: &Predicate) -> Result<usize, StoreError> {
        let state = self.state.lock().await;
        Ok(state.matching(filter).count())
    }

    async fn update_many(&self, filter: &Predicate, patch: &Patch) -> Result<usize, StoreError> {
        let mut state = self.state.lock().await;
        let ids: Vec<ItemId> = state.matching(filter).collect();
        for id in &ids {
            if let Some(item) = state.items.get_mut(id) {
                patch.apply(item);
            }
        }
        Ok(ids.len())
    }

    async fn find_one_and_update(
        &self,
        filter: &Predicate,
        patch: &Patch,
        upsert: bool,
    ) -> Result<Option<Item>, StoreError> {
        let mut state = self.state.lock().await;
        let first = state.matching(filter).next();
        let target = match first {
            Some(id) => id,
            None if upsert => {
                let id = match filter {
                    Predicate::IdIn(ids) if ids.len() == 1 => ids[0],
                    _ => self.ids.generate_item_id(),
                };
                state.insert(Item::new(id, NewItem::default()))?
            }
            None => return Ok(None),
        };
        let Some(item) = state.items.get_mut(&target) else {
            return Ok(None);
        };
        patch.apply(item);
        Ok(Some(item.clone()))
    }

    async fn insert_one(&self, item: NewItem) -> Result<ItemId, StoreError> {
        let id = self.ids.generate_item_id();
        self.state.lock().await.insert(Item::new(id, item))
    }

    async fn distinct(&self, path: &str) -> Result<Vec<Value>, StoreError> {
        let state = self.state.lock().await;
        let mut distinct: Vec<Value> = Vec::new();
        for value in state.unwound_values(path) {
            if !distinct.contains(&value) {
                distinct.push(value);
            }
        }
        Ok(distinct)
    }
}
