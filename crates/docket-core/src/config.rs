//! Config - TOML から読む設定
//!
//! ```toml
//! lease_timeout_minutes = 5
//! batch_size = 3
//! browse_fields = ["journal", "keywords"]
//! private_user_fields = ["email"]
//! user_entry_fields = ["comment", "corrected_title"]
//! submission_log = "entries.jsonl"
//! ```
//!
//! `lease_timeout_minutes` にはデフォルトがない。すべてのリース判定が使う値なので、
//! 未指定は推測せず起動時エラーにする。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{InvalidLeaseTimeout, LeaseTimeout};

pub const DEFAULT_BATCH_SIZE: usize = 3;

/// 設定の読み込み・検証エラー
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    LeaseTimeout(#[from] InvalidLeaseTimeout),

    #[error("batch_size must be at least 1")]
    BatchSize,
}

/// docket の設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocketConfig {
    /// リースの有効期間（分）。必須、1 以上
    pub lease_timeout_minutes: u32,

    /// 1 回の割り当て件数（デフォルト 3）
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// ブラウズ用フィールド。`None` なら全アイテムの `field_order` の和集合
    #[serde(default)]
    pub browse_fields: Option<Vec<String>>,

    /// `user_data.global_fields` のうち、特権のない読み手から隠すフィールド
    #[serde(default)]
    pub private_user_fields: Vec<String>,

    /// `user_data.local_data` の各エントリで、利用者が記入するフィールド
    #[serde(default)]
    pub user_entry_fields: Vec<String>,

    /// 投稿を 1 行 1 JSON で追記するファイル
    #[serde(default)]
    pub submission_log: Option<PathBuf>,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl DocketConfig {
    /// タイムアウトだけ指定し、残りはデフォルト
    pub fn new(lease_timeout_minutes: u32) -> Self {
        Self {
            lease_timeout_minutes,
            batch_size: DEFAULT_BATCH_SIZE,
            browse_fields: None,
            private_user_fields: Vec::new(),
            user_entry_fields: Vec::new(),
            submission_log: None,
        }
    }

    /// TOML 文字列をパースして検証
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// ファイルから読み込んで検証
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// タイムアウトとバッチサイズが 1 以上か
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.lease_timeout()?;
        if self.batch_size == 0 {
            return Err(ConfigError::BatchSize);
        }
        Ok(())
    }

    /// 検証済みの [`LeaseTimeout`]
    pub fn lease_timeout(&self) -> Result<LeaseTimeout, ConfigError> {
        Ok(LeaseTimeout::from_minutes(self.lease_timeout_minutes)?)
    }
}
