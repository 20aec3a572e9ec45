//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryItemStore**: 開発・テスト用のドキュメントストア
//! - **JsonlSubmissionLog**: 投稿ログのファイル追記
//!
//! 本番のドキュメントストア実装は別クレートに配置する想定です。

pub mod inmem_store;
pub mod jsonl_log;

pub use self::inmem_store::InMemoryItemStore;
pub use self::jsonl_log::JsonlSubmissionLog;
