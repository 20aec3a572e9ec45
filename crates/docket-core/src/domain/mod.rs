//! ドメインモデル（ID・アイテム・リース・述語・パッチ・エラー）

pub mod audit;
pub mod changes;
pub mod errors;
pub mod ids;
pub mod item;
pub mod lease;
pub mod patch;
pub mod query;
pub mod reviewer;
pub mod status;

pub use audit::AuditRecord;
pub use changes::{FieldChanges, FieldValue, RESERVED_FIELDS};
pub use errors::DocketError;
pub use ids::{InvalidItemId, ItemId};
pub use item::{Item, NewItem};
pub use lease::{InvalidLeaseTimeout, LeaseTimeout, is_lease_valid};
pub use patch::{DateField, Patch, PatchOp};
pub use query::{FieldOp, Predicate, QueryError};
pub use reviewer::ReviewerId;
pub use status::ItemStatus;
