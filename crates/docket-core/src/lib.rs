//! docket-core
//!
//! 並行して作業するレビュアーへ、リース方式でレビュー対象を割り当てる。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, item, lease, query, patch, changes, errors）
//! - **ports**: 抽象化レイヤー（ItemStore, Clock, IdGenerator, SubmissionLog）
//! - **app**: アプリケーションロジック（allocator, renewal, update, intake, desk）
//! - **impls**: 実装（InMemoryItemStore, JsonlSubmissionLog）
//! - **config**: TOML 設定

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{AllocationMode, DocketBuilder, ReviewDesk, SubmissionTarget, UpdateOutcome};
pub use config::DocketConfig;
pub use domain::DocketError;
