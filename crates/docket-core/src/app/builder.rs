//! DocketBuilder - デスクの構築とワイヤリング
//!
//! # 起動時検証（Fail-fast 設計）
//! - 設定値（リースのタイムアウト、バッチサイズ）は build() 時に検証
//! - ストアは必須。暗黙のグローバル接続は作らない
//! - 時計と投稿ログは省略可（SystemClock / 設定に応じた JSONL or Noop）

use std::sync::Arc;

use super::desk::ReviewDesk;
use crate::config::{ConfigError, DocketConfig};
use crate::impls::JsonlSubmissionLog;
use crate::ports::{Clock, ItemStore, NoopSubmissionLog, SubmissionLog, SystemClock};

/// DocketBuilder は [`ReviewDesk`] を構築
///
/// # 使用例
/// ```ignore
/// let mut desk = DocketBuilder::new(DocketConfig::load("docket.toml")?)
///     .store(Arc::new(InMemoryItemStore::with_system_ids()))
///     .build()?;
/// desk.initialize().await?;
/// ```
pub struct DocketBuilder {
    config: DocketConfig,
    store: Option<Arc<dyn ItemStore>>,
    clock: Option<Arc<dyn Clock>>,
    submission_log: Option<Arc<dyn SubmissionLog>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("no item store was provided")]
    MissingStore,
}

impl DocketBuilder {
    pub fn new(config: DocketConfig) -> Self {
        Self {
            config,
            store: None,
            clock: None,
            submission_log: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn ItemStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// 設定の `submission_log` より優先される投稿ログ
    pub fn submission_log(mut self, log: Arc<dyn SubmissionLog>) -> Self {
        self.submission_log = Some(log);
        self
    }

    pub fn build(self) -> Result<ReviewDesk, BuildError> {
        self.config.validate()?;
        let timeout = self.config.lease_timeout()?;
        let store = self.store.ok_or(BuildError::MissingStore)?;

        let submission_log = match (self.submission_log, &self.config.submission_log) {
            (Some(log), _) => log,
            (None, Some(path)) => Arc::new(JsonlSubmissionLog::new(path.clone())),
            (None, None) => Arc::new(NoopSubmissionLog),
        };

        Ok(ReviewDesk {
            store,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            submission_log,
            timeout,
            batch_size: self.config.batch_size,
            private_user_fields: self.config.private_user_fields,
            user_entry_fields: self.config.user_entry_fields,
            browse_fields: self.config.browse_fields,
        })
    }
}
