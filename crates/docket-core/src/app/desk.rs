//! ReviewDesk - 割り当て・更新・投稿の入口
//!
//! 各操作は状態を持たない（ストアが唯一の共有状態）。デスクが持つのは
//! 設定値と、起動時に一度だけ計算する browse fields だけ。
//!
//! # 起動時処理（initialize）
//! 1. `status` がないアイテムに `triage` を入れる
//! 2. `notes` がないアイテムに `""` を入れる
//! 3. browse fields が未設定なら、全アイテムの `field_order` の和集合を使う

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use super::allocator::{AllocationMode, allocate};
use super::intake::{SubmissionTarget, submit};
use super::renewal::renew_holder_leases;
use super::update::{UpdateOutcome, apply_update};
use crate::domain::{
    DocketError, FieldChanges, FieldOp, Item, ItemId, ItemStatus, LeaseTimeout, Patch, PatchOp,
    Predicate, ReviewerId,
};
use crate::ports::{Clock, ItemStore, SubmissionLog};

/// `user_data` のうち、非公開にできるフィールドを持つサブオブジェクト
pub const SHARED_USER_SECTION: &str = "global_fields";

/// `user_data` のうち、利用者記入エントリの配列
pub const USER_ENTRIES_PATH: &str = "user_data.local_data";

/// 設定・時計・ストアを結線した操作の入口。[`DocketBuilder`](super::DocketBuilder) で作る
pub struct ReviewDesk {
    pub(crate) store: Arc<dyn ItemStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) submission_log: Arc<dyn SubmissionLog>,
    pub(crate) timeout: LeaseTimeout,
    pub(crate) batch_size: usize,
    pub(crate) private_user_fields: Vec<String>,
    pub(crate) user_entry_fields: Vec<String>,
    pub(crate) browse_fields: Option<Vec<String>>,
}

impl ReviewDesk {
    /// `status` / `notes` のバックフィルと browse fields の確定
    ///
    /// 何度呼んでもよい。
    pub async fn initialize(&mut self) -> Result<(), DocketError> {
        let statuses = self
            .store
            .update_many(
                &Predicate::missing("status"),
                &Patch::new().with(PatchOp::SetStatusIfMissing(ItemStatus::Triage)),
            )
            .await?;
        let notes = self
            .store
            .update_many(
                &Predicate::missing("notes"),
                &Patch::new().with(PatchOp::SetNotesIfMissing(String::new())),
            )
            .await?;

        if self.browse_fields.is_none() {
            let mut fields: Vec<String> = self
                .store
                .distinct("field_order")
                .await?
                .into_iter()
                .filter_map(|value| match value {
                    Value::String(name) => Some(name),
                    _ => None,
                })
                .collect();
            fields.sort();
            fields.dedup();
            self.browse_fields = Some(fields);
        }

        info!(statuses, notes, browse_fields = ?self.browse_fields, "desk initialized");
        Ok(())
    }

    /// 設定済みのリース有効期間
    pub fn lease_timeout(&self) -> LeaseTimeout {
        self.timeout
    }

    /// 設定済みのバッチサイズ
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// 結線されているストア
    pub fn store(&self) -> &Arc<dyn ItemStore> {
        &self.store
    }

    /// 設定のバッチサイズで割り当て
    pub async fn allocate(
        &self,
        reviewer: &ReviewerId,
        mode: AllocationMode,
    ) -> Result<Vec<Item>, DocketError> {
        self.allocate_batch(reviewer, self.batch_size, mode).await
    }

    /// バッチサイズを指定して割り当て
    pub async fn allocate_batch(
        &self,
        reviewer: &ReviewerId,
        batch_size: usize,
        mode: AllocationMode,
    ) -> Result<Vec<Item>, DocketError> {
        allocate(
            self.store.as_ref(),
            reviewer,
            batch_size,
            self.timeout,
            mode,
            self.clock.now(),
        )
        .await
    }

    /// 現在時刻でリース確認つき更新（[`apply_update`]）
    pub async fn apply_update(
        &self,
        item_id: ItemId,
        reviewer: &ReviewerId,
        changes: FieldChanges,
    ) -> Result<UpdateOutcome, DocketError> {
        apply_update(
            self.store.as_ref(),
            item_id,
            reviewer,
            self.timeout,
            changes,
            self.clock.now(),
        )
        .await
    }

    /// `reviewer` の有効なリースをすべて現在時刻で延長
    pub async fn renew(&self, reviewer: &ReviewerId) -> Result<usize, DocketError> {
        renew_holder_leases(self.store.as_ref(), reviewer, self.clock.now(), self.timeout).await
    }

    /// 外部からの投稿を受け付ける（[`submit`]）
    pub async fn submit(
        &self,
        target: SubmissionTarget,
        user_data: Value,
        new_status: ItemStatus,
    ) -> Result<ItemId, DocketError> {
        submit(
            self.store.as_ref(),
            self.submission_log.as_ref(),
            target,
            user_data,
            new_status,
            self.clock.now(),
        )
        .await
    }

    /// ID でアイテムを取得。なければ NotFound
    pub async fn item(&self, id: ItemId) -> Result<Item, DocketError> {
        self.store
            .find_one(&Predicate::id(id))
            .await?
            .ok_or(DocketError::NotFound(id))
    }

    /// ステータスが一致するアイテム
    pub async fn items_by_status(&self, status: &ItemStatus) -> Result<Vec<Item>, DocketError> {
        Ok(self
            .store
            .find(&Predicate::eq("status", status.as_str()), None)
            .await?)
    }

    /// `field` が `raw` に等しいアイテム。`"NaN"` は欠損値マーカーを選ぶ
    pub async fn items_by_field(&self, field: &str, raw: &str) -> Result<Vec<Item>, DocketError> {
        Ok(self
            .store
            .find(&Predicate::field_matches_raw(field, raw), None)
            .await?)
    }

    /// 呼び出し側の JSON パターンで検索。不正なら MalformedFilter
    pub async fn query(&self, pattern: &Value) -> Result<Vec<Item>, DocketError> {
        let filter = Predicate::from_pattern(pattern)?;
        Ok(self.store.find(&filter, None).await?)
    }

    /// アイテムの user_data。`privileged` でなければ非公開フィールドを除く
    pub async fn user_data(&self, id: ItemId, privileged: bool) -> Result<Value, DocketError> {
        let mut data = self
            .item(id)
            .await?
            .user_data
            .unwrap_or_else(|| Value::Object(Default::default()));
        if !privileged
            && let Some(Value::Object(shared)) = data.get_mut(SHARED_USER_SECTION)
        {
            for field in &self.private_user_fields {
                shared.remove(field);
            }
        }
        Ok(data)
    }

    /// 利用者記入エントリのうち、設定された記入フィールドのどれかが
    /// 空でない値で埋まっているものを 1 つ以上持つアイテム
    ///
    /// 記入フィールドが未設定なら空。
    pub async fn items_with_user_entries(&self) -> Result<Vec<Item>, DocketError> {
        if self.user_entry_fields.is_empty() {
            return Ok(Vec::new());
        }
        let filled = self
            .user_entry_fields
            .iter()
            .map(|field| {
                Predicate::field(field.as_str(), FieldOp::Exists(true))
                    .and(Predicate::field(field.as_str(), FieldOp::Ne(Value::from(""))))
            })
            .collect();
        let filter = Predicate::any_element(USER_ENTRIES_PATH, Predicate::Or(filled));
        Ok(self.store.find(&filter, None).await?)
    }

    /// 設定された browse fields、または [`initialize`](Self::initialize) で計算したもの
    pub fn browse_fields(&self) -> &[String] {
        self.browse_fields.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::DocketBuilder;
    use crate::config::DocketConfig;
    use crate::domain::{Item, NewItem};
    use crate::impls::InMemoryItemStore;
    use crate::ports::FixedClock;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::json;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
    }

    struct Fixture {
        desk: ReviewDesk,
        store: Arc<InMemoryItemStore>,
        clock: Arc<FixedClock>,
    }

    async fn fixture(config: DocketConfig, docs: Vec<Value>) -> Fixture {
        let store = Arc::new(InMemoryItemStore::with_system_ids());
        for doc in docs {
            let draft: NewItem = serde_json::from_value(doc).unwrap();
            store.insert_one(draft).await.unwrap();
        }
        let clock = Arc::new(FixedClock::new(start()));
        let mut desk = DocketBuilder::new(config)
            .store(store.clone())
            .clock(clock.clone())
            .build()
            .unwrap();
        desk.initialize().await.unwrap();
        Fixture { desk, store, clock }
    }

    fn papers(n: usize) -> Vec<Value> {
        (0..n).map(|i| json!({"title": format!("paper {i}")})).collect()
    }

    fn ids(items: &[Item]) -> Vec<ItemId> {
        items.iter().map(|item| item.id).collect()
    }

    #[tokio::test]
    async fn abandoned_batch_moves_to_the_next_reviewer() {
        let f = fixture(DocketConfig::new(5), papers(3)).await;
        let alice = ReviewerId::new("alice");
        let bob = ReviewerId::new("bob");

        let first = f.desk.allocate(&alice, AllocationMode::Continue).await.unwrap();
        assert_eq!(first.len(), 3);

        f.clock.advance(Duration::minutes(6));
        let second = f.desk.allocate(&bob, AllocationMode::Continue).await.unwrap();

        assert_eq!(ids(&second), ids(&first));
        assert!(second.iter().all(|item| item.holder() == Some(&bob)));
    }

    #[tokio::test]
    async fn live_batch_is_not_handed_out_twice() {
        let f = fixture(DocketConfig::new(5), papers(3)).await;

        let first = f
            .desk
            .allocate(&ReviewerId::new("alice"), AllocationMode::Continue)
            .await
            .unwrap();
        f.clock.advance(Duration::minutes(4));
        let second = f
            .desk
            .allocate(&ReviewerId::new("bob"), AllocationMode::Continue)
            .await
            .unwrap();

        assert_eq!(first.len(), 3);
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn editing_one_item_keeps_the_whole_batch() {
        let f = fixture(DocketConfig::new(5), papers(3)).await;
        let bob = ReviewerId::new("bob");
        let batch = f.desk.allocate(&bob, AllocationMode::Continue).await.unwrap();
        let (x, y, z) = (batch[0].id, batch[1].id, batch[2].id);

        f.clock.advance(Duration::minutes(4));
        let outcome = f
            .desk
            .apply_update(x, &bob, FieldChanges::new().set("notes", "checked"))
            .await
            .unwrap();
        assert!(matches!(outcome, UpdateOutcome::Applied(_)));

        let edited_at = f.clock.now();
        for id in [y, z] {
            let item = f.desk.item(id).await.unwrap();
            assert_eq!(item.lease_timestamp, Some(edited_at));
            assert_eq!(item.holder(), Some(&bob));
        }

        // 4 more minutes: past the allocation stamp, within the renewed one
        f.clock.advance(Duration::minutes(4));
        let resumed = f.desk.allocate(&bob, AllocationMode::Continue).await.unwrap();
        assert_eq!(ids(&resumed), vec![x, y, z]);
    }

    #[tokio::test]
    async fn competing_edit_is_denied() {
        let f = fixture(DocketConfig::new(5), papers(1)).await;
        let alice = ReviewerId::new("alice");
        let batch = f.desk.allocate(&alice, AllocationMode::Continue).await.unwrap();
        let id = batch[0].id;

        let err = f
            .desk
            .apply_update(id, &ReviewerId::new("bob"), FieldChanges::new().set("notes", "x"))
            .await
            .unwrap_err();

        assert!(err.is_lease_denied());
        assert_eq!(f.desk.item(id).await.unwrap().notes(), "");
    }

    #[tokio::test]
    async fn advance_skips_to_fresh_items() {
        let f = fixture(
            DocketConfig {
                batch_size: 2,
                ..DocketConfig::new(5)
            },
            papers(4),
        )
        .await;
        let alice = ReviewerId::new("alice");

        let first = f.desk.allocate(&alice, AllocationMode::Continue).await.unwrap();
        let next = f.desk.allocate(&alice, AllocationMode::Advance).await.unwrap();

        assert_eq!(next.len(), 2);
        assert!(ids(&next).iter().all(|id| !ids(&first).contains(id)));
        for item in &first {
            assert_eq!(f.desk.item(item.id).await.unwrap().holder(), None);
        }
    }

    #[tokio::test]
    async fn initialize_backfills_and_collects_browse_fields() {
        let f = fixture(
            DocketConfig::new(5),
            vec![
                json!({"field_order": ["title", "journal"]}),
                json!({"field_order": ["abstract", "title"], "status": "accepted", "notes": "ok"}),
            ],
        )
        .await;

        assert_eq!(f.desk.browse_fields(), ["abstract", "journal", "title"]);

        let items = f.store.snapshot().await;
        assert_eq!(items[0].status, Some(ItemStatus::Triage));
        assert_eq!(items[0].notes.as_deref(), Some(""));
        assert_eq!(items[1].status, Some(ItemStatus::from("accepted")));
        assert_eq!(items[1].notes.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn configured_browse_fields_win() {
        let config = DocketConfig {
            browse_fields: Some(vec!["journal".to_string()]),
            ..DocketConfig::new(5)
        };
        let f = fixture(config, vec![json!({"field_order": ["title"]})]).await;

        assert_eq!(f.desk.browse_fields(), ["journal"]);
    }

    #[tokio::test]
    async fn lookups_by_status_field_and_pattern() {
        let f = fixture(
            DocketConfig::new(5),
            vec![
                json!({"journal": "ApJ", "score": 4}),
                json!({"journal": "NaN", "score": 1}),
                json!({"journal": null, "status": "accepted"}),
            ],
        )
        .await;

        let triage = f.desk.items_by_status(&ItemStatus::Triage).await.unwrap();
        assert_eq!(triage.len(), 2);

        let apj = f.desk.items_by_field("journal", "ApJ").await.unwrap();
        assert_eq!(apj.len(), 1);

        let nan = f.desk.items_by_field("journal", "NaN").await.unwrap();
        assert_eq!(nan.len(), 2);

        let high = f.desk.query(&json!({"score": {"$gte": 3}})).await.unwrap();
        assert_eq!(ids(&high), ids(&apj));

        let err = f.desk.query(&json!({"score": {"$near": 3}})).await.unwrap_err();
        assert!(matches!(err, DocketError::MalformedFilter(_)));
    }

    #[tokio::test]
    async fn missing_item_lookup_is_not_found() {
        let f = fixture(DocketConfig::new(5), papers(1)).await;
        let missing = ItemId::from_ulid(ulid::Ulid::new());

        assert!(f.desk.item(missing).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn private_user_fields_are_hidden_from_regular_readers() {
        let config = DocketConfig {
            private_user_fields: vec!["email".to_string()],
            ..DocketConfig::new(5)
        };
        let f = fixture(config, Vec::new()).await;
        let id = f
            .desk
            .submit(
                SubmissionTarget::New,
                json!({"global_fields": {"email": "a@b.c", "name": "A"}, "title": "T"}),
                ItemStatus::UserSubmitted,
            )
            .await
            .unwrap();

        let public = f.desk.user_data(id, false).await.unwrap();
        assert_eq!(public, json!({"global_fields": {"name": "A"}, "title": "T"}));

        let full = f.desk.user_data(id, true).await.unwrap();
        assert_eq!(full["global_fields"]["email"], json!("a@b.c"));
    }

    #[tokio::test]
    async fn submitted_item_enters_allocation() {
        let f = fixture(DocketConfig::new(5), Vec::new()).await;
        let id = f
            .desk
            .submit(SubmissionTarget::New, json!({"a": 1}), ItemStatus::UserSubmitted)
            .await
            .unwrap();

        assert_eq!(f.desk.item(id).await.unwrap().status(), ItemStatus::UserSubmitted);

        let batch = f
            .desk
            .allocate(&ReviewerId::new("alice"), AllocationMode::Continue)
            .await
            .unwrap();
        assert_eq!(ids(&batch), vec![id]);
    }

    #[tokio::test]
    async fn renew_extends_live_leases_only() {
        let f = fixture(DocketConfig::new(5), papers(2)).await;
        let alice = ReviewerId::new("alice");
        f.desk.allocate(&alice, AllocationMode::Continue).await.unwrap();

        f.clock.advance(Duration::minutes(2));
        assert_eq!(f.desk.renew(&alice).await.unwrap(), 2);

        f.clock.advance(Duration::minutes(10));
        assert_eq!(f.desk.renew(&alice).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn user_entries_need_a_filled_entry_field() {
        let config = DocketConfig {
            user_entry_fields: vec!["comment".to_string(), "corrected_title".to_string()],
            ..DocketConfig::new(5)
        };
        let f = fixture(
            config,
            vec![
                json!({"user_data": {"local_data": [{"comment": ""}, {"corrected_title": "Fixed"}]}}),
                json!({"user_data": {"local_data": [{"comment": "typo in eq. 3"}]}}),
                json!({"user_data": {"local_data": [{"comment": ""}, {"unrelated": "x"}]}}),
                json!({"user_data": {"local_data": []}}),
                json!({"user_data": {"global_fields": {"comment": "not an entry"}}}),
                json!({"title": "no user data"}),
            ],
        )
        .await;
        let all = f.store.snapshot().await;

        let found = f.desk.items_with_user_entries().await.unwrap();

        assert_eq!(ids(&found), vec![all[0].id, all[1].id]);
    }

    #[tokio::test]
    async fn user_entries_without_configured_fields_is_empty() {
        let f = fixture(
            DocketConfig::new(5),
            vec![json!({"user_data": {"local_data": [{"comment": "x"}]}})],
        )
        .await;

        assert!(f.desk.items_with_user_entries().await.unwrap().is_empty());
    }
}
