//! App - アプリケーション層
//!
//! ports を組み合わせてレビュー割り当てのロジックを実装します。
//!
//! # 主要コンポーネント
//! - **allocate**: バッチの割り当て（Continue / Advance）
//! - **renew_holder_leases**: 保持中リースの一括延長（カスケード）
//! - **apply_update**: リース確認つきの更新と監査ログ
//! - **submit**: 外部からの投稿受付
//! - **ReviewDesk / DocketBuilder**: 上記を設定・時計・ストアと結線した入口

pub mod allocator;
pub mod builder;
pub mod desk;
pub mod intake;
pub mod renewal;
pub mod update;

// 主要な型を再エクスポート
pub use self::allocator::{AllocationMode, allocate};
pub use self::builder::{BuildError, DocketBuilder};
pub use self::desk::ReviewDesk;
pub use self::intake::{SubmissionTarget, submit};
pub use self::renewal::renew_holder_leases;
pub use self::update::{UpdateOutcome, apply_update};
