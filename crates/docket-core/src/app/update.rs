//! Update - リース確認つきの更新と監査ログ
//!
//! # フロー
//! 1. アイテムを読む（なければ NotFound）
//! 2. 呼び出し元のリースが有効か確認（無効なら LeaseDenied、何も書かない）
//! 3. Unset を落とす。何も残らなければ NoOp
//! 4. 予約フィールド・不正な値を弾く
//! 5. 1 回の条件つき更新で「フィールドのマージ + リース打刻 + log 追記」
//!    条件は「ID 一致かつ呼び出し元のリースが有効」なので、1 と 5 の間に
//!    リースが切れたり奪われたりしていれば書き込まれずに LeaseDenied
//! 6. 同じレビュアーの他のアイテムのリースを延長（カスケード）
//!
//! ここでのリース確認は割り当て時と違って厳密（書き込み前に必ず確認する）。
//! 同じ変更を再送すると監査レコードは重複する（重複排除はしない）。

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::renewal::renew_holder_leases;
use crate::domain::changes::{field_order_from, is_reserved};
use crate::domain::{
    AuditRecord, DocketError, FieldChanges, Item, ItemId, LeaseTimeout, Patch, PatchOp, Predicate,
    ReviewerId, is_lease_valid,
};
use crate::ports::ItemStore;

/// 更新の結果
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// マージ済み。更新後に保存されている Item を持つ
    Applied(Item),

    /// 変更要求がすべて Unset だった。何も書いていない
    NoOp,
}

/// `reviewer` のリースのもとで `changes` を `item_id` にマージする
pub async fn apply_update(
    store: &dyn ItemStore,
    item_id: ItemId,
    reviewer: &ReviewerId,
    timeout: LeaseTimeout,
    changes: FieldChanges,
    now: DateTime<Utc>,
) -> Result<UpdateOutcome, DocketError> {
    let by_id = Predicate::id(item_id);
    let item = store
        .find_one(&by_id)
        .await?
        .ok_or(DocketError::NotFound(item_id))?;

    if !is_lease_valid(&item, Some(reviewer), timeout, now) {
        warn!(%item_id, %reviewer, holder = ?item.lock_holder, "update denied, no live lease");
        return Err(lease_denied(item_id, reviewer));
    }

    let effective = changes.into_effective();
    if effective.is_empty() {
        return Ok(UpdateOutcome::NoOp);
    }
    if let Some(field) = effective.keys().find(|field| is_reserved(field)) {
        return Err(DocketError::ReservedField(field.clone()));
    }
    if let Some(order) = effective.get("field_order")
        && field_order_from(order).is_none()
    {
        return Err(DocketError::InvalidFieldValue {
            field: "field_order".to_string(),
            expected: "a list of field names",
        });
    }

    let changed = effective.len();
    let record = AuditRecord::new(reviewer.clone(), now, effective.clone());
    let patch = Patch::new()
        .with(PatchOp::MergeFields(effective))
        .with(PatchOp::SetLeaseTimestamp(now))
        .with(PatchOp::PushLog(record));
    let guarded = by_id.and(Predicate::LeaseHeld {
        holder: reviewer.clone(),
        since: timeout.cutoff(now),
    });

    // 読み取り後にリースが切れた・移った場合はここで弾かれる
    let Some(updated) = store.find_one_and_update(&guarded, &patch, false).await? else {
        warn!(%item_id, %reviewer, "lease lost before write");
        return Err(lease_denied(item_id, reviewer));
    };

    let renewed = renew_holder_leases(store, reviewer, now, timeout).await?;
    info!(%item_id, %reviewer, changed, renewed, "applied update");
    Ok(UpdateOutcome::Applied(updated))
}

fn lease_denied(item: ItemId, reviewer: &ReviewerId) -> DocketError {
    DocketError::LeaseDenied {
        item,
        holder: reviewer.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ItemStatus, NewItem};
    use crate::impls::InMemoryItemStore;
    use crate::ports::StoreError;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use rstest::rstest;
    use serde_json::{Value, json};
    use ulid::Ulid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn timeout() -> LeaseTimeout {
        LeaseTimeout::from_minutes(5).unwrap()
    }

    async fn leased_item(store: &InMemoryItemStore, holder: &str, stamped: DateTime<Utc>) -> ItemId {
        let mut item = Item::new(ItemId::from_ulid(Ulid::new()), NewItem::default());
        item.lock_holder = Some(ReviewerId::new(holder));
        item.lease_timestamp = Some(stamped);
        store.restore(item).await.unwrap()
    }

    async fn fetch(store: &InMemoryItemStore, id: ItemId) -> Item {
        store.find_one(&Predicate::id(id)).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn applies_changes_and_appends_one_record() {
        let store = InMemoryItemStore::with_system_ids();
        let alice = ReviewerId::new("alice");
        let id = leased_item(&store, "alice", now() - Duration::minutes(1)).await;

        let changes = FieldChanges::new()
            .set("status", "accepted")
            .set("journal", "ApJ")
            .unset("notes");
        let outcome = apply_update(&store, id, &alice, timeout(), changes, now())
            .await
            .unwrap();

        let UpdateOutcome::Applied(item) = outcome else {
            panic!("expected Applied, got {outcome:?}");
        };
        assert_eq!(item.status(), ItemStatus::Other("accepted".to_string()));
        assert_eq!(item.fields["journal"], json!("ApJ"));
        assert_eq!(item.lease_timestamp, Some(now()));
        assert_eq!(item.log.len(), 1);

        let record = &item.log[0];
        assert_eq!(record.holder, alice);
        assert_eq!(record.time, now());
        assert_eq!(record.changes.len(), 2);
        assert!(!record.changes.contains_key("notes"));
    }

    #[tokio::test]
    async fn someone_elses_live_lease_is_denied() {
        let store = InMemoryItemStore::with_system_ids();
        let id = leased_item(&store, "alice", now()).await;
        let before = fetch(&store, id).await;

        let err = apply_update(
            &store,
            id,
            &ReviewerId::new("bob"),
            timeout(),
            FieldChanges::new().set("notes", "mine now"),
            now(),
        )
        .await
        .unwrap_err();

        assert!(err.is_lease_denied());
        assert_eq!(fetch(&store, id).await, before);
    }

    #[tokio::test]
    async fn own_expired_lease_is_denied() {
        let store = InMemoryItemStore::with_system_ids();
        let id = leased_item(&store, "alice", now() - Duration::minutes(6)).await;

        let err = apply_update(
            &store,
            id,
            &ReviewerId::new("alice"),
            timeout(),
            FieldChanges::new().set("notes", "late"),
            now(),
        )
        .await
        .unwrap_err();

        assert!(err.is_lease_denied());
        assert!(fetch(&store, id).await.log.is_empty());
    }

    #[tokio::test]
    async fn missing_item_is_not_found() {
        let store = InMemoryItemStore::with_system_ids();
        let missing = ItemId::from_ulid(Ulid::new());

        let err = apply_update(
            &store,
            missing,
            &ReviewerId::new("alice"),
            timeout(),
            FieldChanges::new().set("notes", "x"),
            now(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DocketError::NotFound(id) if id == missing));
        assert!(!err.is_lease_denied());
    }

    #[tokio::test]
    async fn all_unset_is_a_noop() {
        let store = InMemoryItemStore::with_system_ids();
        let stamped = now() - Duration::minutes(1);
        let id = leased_item(&store, "alice", stamped).await;
        let before = fetch(&store, id).await;

        let outcome = apply_update(
            &store,
            id,
            &ReviewerId::new("alice"),
            timeout(),
            FieldChanges::new().unset("notes").unset("status"),
            now(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, UpdateOutcome::NoOp);
        assert_eq!(fetch(&store, id).await, before);
    }

    #[rstest]
    #[case::holder("lock_holder", json!("bob"))]
    #[case::log("log", json!([]))]
    #[case::init_date("init_date", json!("bogus"))]
    #[case::change_date("change_date", json!("2020-01-01T00:00:00Z"))]
    #[tokio::test]
    async fn reserved_fields_are_refused(#[case] field: &str, #[case] value: Value) {
        let store = InMemoryItemStore::with_system_ids();
        let id = leased_item(&store, "alice", now()).await;
        let before = fetch(&store, id).await;

        let err = apply_update(
            &store,
            id,
            &ReviewerId::new("alice"),
            timeout(),
            FieldChanges::new().set(field, value),
            now(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DocketError::ReservedField(f) if f == field));
        assert_eq!(fetch(&store, id).await, before);
    }

    #[tokio::test]
    async fn field_order_edit_survives_a_save_and_reload() {
        let store = InMemoryItemStore::with_system_ids();
        let alice = ReviewerId::new("alice");
        let mut item = Item::new(
            ItemId::from_ulid(Ulid::new()),
            NewItem {
                field_order: vec!["title".to_string()],
                ..NewItem::default()
            },
        );
        item.lock_holder = Some(alice.clone());
        item.lease_timestamp = Some(now());
        item.init_date = Some(now() - Duration::days(1));
        let id = store.restore(item).await.unwrap();

        let changes = FieldChanges::new()
            .set("field_order", json!(["journal", "title"]))
            .set("journal", "ApJ");
        let UpdateOutcome::Applied(updated) =
            apply_update(&store, id, &alice, timeout(), changes, now())
                .await
                .unwrap()
        else {
            panic!("expected Applied");
        };

        assert_eq!(updated.field_order, vec!["journal".to_string(), "title".to_string()]);
        assert!(!updated.fields.contains_key("field_order"));

        let saved = serde_json::to_string(&store.snapshot().await).unwrap();
        let reloaded: Vec<Item> = serde_json::from_str(&saved).unwrap();
        assert_eq!(reloaded, vec![updated]);
    }

    #[tokio::test]
    async fn malformed_field_order_is_refused() {
        let store = InMemoryItemStore::with_system_ids();
        let id = leased_item(&store, "alice", now()).await;
        let before = fetch(&store, id).await;

        let err = apply_update(
            &store,
            id,
            &ReviewerId::new("alice"),
            timeout(),
            FieldChanges::new().set("field_order", "title"),
            now(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DocketError::InvalidFieldValue { field, .. } if field == "field_order"));
        assert_eq!(fetch(&store, id).await, before);
    }

    /// 書き込み直前に `target` のリースを別のレビュアーへ移す
    struct LeaseMovesBeforeWrite {
        inner: InMemoryItemStore,
        target: ItemId,
        taken_by: ReviewerId,
    }

    #[async_trait]
    impl ItemStore for LeaseMovesBeforeWrite {
        async fn find(
            &self,
            filter: &Predicate,
            limit: Option<usize>,
        ) -> Result<Vec<Item>, StoreError> {
            self.inner.find(filter, limit).await
        }

        async fn count(&self, filter: &Predicate) -> Result<usize, StoreError> {
            self.inner.count(filter).await
        }

        async fn update_many(&self, filter: &Predicate, patch: &Patch) -> Result<usize, StoreError> {
            self.inner.update_many(filter, patch).await
        }

        async fn find_one_and_update(
            &self,
            filter: &Predicate,
            patch: &Patch,
            upsert: bool,
        ) -> Result<Option<Item>, StoreError> {
            self.inner
                .update_many(
                    &Predicate::id(self.target),
                    &Patch::new().lease(self.taken_by.clone(), now()),
                )
                .await?;
            self.inner.find_one_and_update(filter, patch, upsert).await
        }

        async fn insert_one(&self, item: NewItem) -> Result<ItemId, StoreError> {
            self.inner.insert_one(item).await
        }

        async fn distinct(&self, path: &str) -> Result<Vec<Value>, StoreError> {
            self.inner.distinct(path).await
        }
    }

    #[tokio::test]
    async fn lease_lost_between_read_and_write_is_denied() {
        let inner = InMemoryItemStore::with_system_ids();
        let stamped = now() - Duration::minutes(2);
        let target = leased_item(&inner, "alice", stamped).await;
        let sibling = leased_item(&inner, "alice", stamped).await;
        let store = LeaseMovesBeforeWrite {
            inner,
            target,
            taken_by: ReviewerId::new("bob"),
        };

        let err = apply_update(
            &store,
            target,
            &ReviewerId::new("alice"),
            timeout(),
            FieldChanges::new().set("notes", "too late"),
            now(),
        )
        .await
        .unwrap_err();

        assert!(err.is_lease_denied());
        let taken = fetch(&store.inner, target).await;
        assert!(taken.log.is_empty());
        assert_eq!(taken.notes, None);
        assert_eq!(taken.holder(), Some(&ReviewerId::new("bob")));
        assert_eq!(fetch(&store.inner, sibling).await.lease_timestamp, Some(stamped));
    }

    #[tokio::test]
    async fn update_renews_the_rest_of_the_batch() {
        let store = InMemoryItemStore::with_system_ids();
        let alice = ReviewerId::new("alice");
        let stamped = now() - Duration::minutes(3);
        let x = leased_item(&store, "alice", stamped).await;
        let y = leased_item(&store, "alice", stamped).await;
        let other = leased_item(&store, "bob", stamped).await;

        apply_update(
            &store,
            x,
            &alice,
            timeout(),
            FieldChanges::new().set("notes", "x done"),
            now(),
        )
        .await
        .unwrap();

        assert_eq!(fetch(&store, y).await.lease_timestamp, Some(now()));
        assert_eq!(fetch(&store, other).await.lease_timestamp, Some(stamped));
        assert!(fetch(&store, y).await.log.is_empty());
    }

    #[tokio::test]
    async fn repeated_update_duplicates_the_record() {
        let store = InMemoryItemStore::with_system_ids();
        let alice = ReviewerId::new("alice");
        let id = leased_item(&store, "alice", now()).await;
        let changes = FieldChanges::new().set("notes", "same");

        apply_update(&store, id, &alice, timeout(), changes.clone(), now())
            .await
            .unwrap();
        let later = now() + Duration::seconds(1);
        apply_update(&store, id, &alice, timeout(), changes, later)
            .await
            .unwrap();

        let item = fetch(&store, id).await;
        assert_eq!(item.log.len(), 2);
        assert!(item.log[0].time < item.log[1].time);
        assert_eq!(item.lease_timestamp, Some(later));
    }
}
