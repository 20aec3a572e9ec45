//! IdGenerator port - ID 生成の抽象化
//!
//! テスト容易性のために、trait として抽象化しています。
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use std::sync::Mutex;

use ulid::{Generator, Ulid};

use crate::domain::ItemId;
use crate::ports::Clock;

/// IdGenerator はストアが採番する item id を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数タスクから使える）
pub trait IdGenerator: Send + Sync {
    fn generate_item_id(&self) -> ItemId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock の時刻を timestamp 部に使います。同じミリ秒内では単調増加するので、
/// 生成順 = ソート順が保たれます。
pub struct UlidGenerator<C> {
    clock: C,
    generator: Mutex<Generator>,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            generator: Mutex::new(Generator::new()),
        }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_item_id(&self) -> ItemId {
        let now: std::time::SystemTime = self.clock.now().into();
        let mut generator = self.generator.lock().unwrap_or_else(|e| e.into_inner());
        // 単調増加のランダム部が溢れた時だけ失敗する。その場合は通常の ULID に落とす
        let ulid = generator
            .generate_from_datetime(now)
            .unwrap_or_else(|_| Ulid::from_datetime(now));
        ItemId::from_ulid(ulid)
    }
}
