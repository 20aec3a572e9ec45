//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（ドキュメントストア、ファイル、時計）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - ドキュメントストアが唯一の共有状態（正本）
//! - リースはアイテム上の 2 フィールドで表現し、別テーブルは持たない
//! - 時刻と ID はテストで差し替えられるよう trait 経由で受け取る

pub mod clock;
pub mod id_generator;
pub mod item_store;
pub mod submission_log;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::item_store::{ItemStore, StoreError};
pub use self::submission_log::{NoopSubmissionLog, SubmissionEntry, SubmissionLog};
