//! Predicate - 型つきクエリ述語
//!
//! クエリドキュメントを文字列で組み立てず、(フィールド, 演算子, 値) の組で表す。
//! 呼び出し側が渡す JSON パターンは [`Predicate::from_pattern`] を通し、
//! 解釈できないものは [`QueryError`] で弾く。
//!
//! # 評価対象
//! - 通常はアイテム全体（[`Item::to_document`] の形）
//! - [`Predicate::AnyElement`] の内側は配列の各要素（素の JSON 値）。
//!   ID・リース系の述語は要素に対しては常に偽

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::item::lookup;
use super::{Item, ItemId, ReviewerId};

/// [`Predicate::field_matches_raw`] で「数値でない」値を選ぶための生の値
pub const NAN_SENTINEL: &str = "NaN";

/// 呼び出し側パターンの解釈エラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("query pattern must be a JSON object")]
    NotAnObject,

    #[error("invalid _id in query pattern: {0}")]
    InvalidId(String),

    #[error("unsupported query operator: {0}")]
    UnknownOperator(String),

    #[error("operator {op} expects {expected}")]
    InvalidOperand { op: String, expected: &'static str },

    #[error("field {0} mixes operators and plain keys")]
    MixedOperators(String),
}

/// フィールドパスで見つかった値に対する比較
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Eq(Value),
    Ne(Value),
    Exists(bool),
    /// `null` または文字列 `"NaN"` にマッチ（取り込み時に数値でなかった値の表現）
    IsNan,
    Lt(Value),
    Gte(Value),
    In(Vec<Value>),
}

/// アイテム（または配列要素）に対する述語
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    All,
    IdIn(Vec<ItemId>),
    Field { path: String, op: FieldOp },

    /// `path` の配列に `pred` を満たす要素が 1 つ以上ある（`$elemMatch`）
    AnyElement { path: String, pred: Box<Predicate> },

    /// `holder` が保持し、`since` 以降に打刻されたリース
    LeaseHeld { holder: ReviewerId, since: DateTime<Utc> },

    /// リースなし、または `since` より前の打刻
    LeaseFree { since: DateTime<Utc> },

    /// `lock_holder == holder`（リースの新しさは見ない）
    LockHeldBy(ReviewerId),

    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    /// ID 1 つに一致
    pub fn id(id: ItemId) -> Self {
        Predicate::IdIn(vec![id])
    }

    /// `path` の値に `op` を適用
    pub fn field(path: impl Into<String>, op: FieldOp) -> Self {
        Predicate::Field {
            path: path.into(),
            op,
        }
    }

    /// `path` の値が `value` に等しい
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(path, FieldOp::Eq(value.into()))
    }

    /// `path` が存在しない
    pub fn missing(path: impl Into<String>) -> Self {
        Self::field(path, FieldOp::Exists(false))
    }

    /// `path` の配列のいずれかの要素が `pred` を満たす
    pub fn any_element(path: impl Into<String>, pred: Predicate) -> Self {
        Predicate::AnyElement {
            path: path.into(),
            pred: Box::new(pred),
        }
    }

    /// 両方を満たす（左が And ならそこに追加）
    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut parts) => {
                parts.push(other);
                Predicate::And(parts)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    /// 生の文字列値での等値比較。`"NaN"` は [`FieldOp::IsNan`] として扱う
    pub fn field_matches_raw(path: impl Into<String>, raw: &str) -> Self {
        if raw == NAN_SENTINEL {
            Self::field(path, FieldOp::IsNan)
        } else {
            Self::eq(path, raw)
        }
    }

    /// 呼び出し側のパターンを解釈する
    /// （例: `{"status": "triage", "score": {"$gte": 3}}`）
    pub fn from_pattern(pattern: &Value) -> Result<Self, QueryError> {
        let Value::Object(map) = pattern else {
            return Err(QueryError::NotAnObject);
        };
        let mut parts = map
            .iter()
            .map(|(key, value)| parse_entry(key, value))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(match parts.len() {
            0 => Predicate::All,
            1 => parts.remove(0),
            _ => Predicate::And(parts),
        })
    }

    /// `item` がこの述語を満たすか
    pub fn matches(&self, item: &Item) -> bool {
        let doc = item.to_document();
        self.eval(Some(item), &doc)
    }

    /// `item` が `None` のときは配列要素 `doc` に対する評価
    fn eval(&self, item: Option<&Item>, doc: &Value) -> bool {
        match self {
            Predicate::All => true,
            Predicate::IdIn(ids) => item.is_some_and(|item| ids.contains(&item.id)),
            Predicate::Field { path, op } => op.eval(lookup(doc, path)),
            Predicate::AnyElement { path, pred } => match lookup(doc, path) {
                Some(Value::Array(elements)) => elements.iter().any(|e| pred.eval(None, e)),
                _ => false,
            },
            Predicate::LeaseHeld { holder, since } => item.is_some_and(|item| {
                item.lock_holder.as_ref() == Some(holder)
                    && item.lease_timestamp.is_some_and(|t| t >= *since)
            }),
            Predicate::LeaseFree { since } => {
                item.is_some_and(|item| item.lease_timestamp.is_none_or(|t| t < *since))
            }
            Predicate::LockHeldBy(holder) => {
                item.is_some_and(|item| item.lock_holder.as_ref() == Some(holder))
            }
            Predicate::And(parts) => parts.iter().all(|p| p.eval(item, doc)),
            Predicate::Or(parts) => parts.iter().any(|p| p.eval(item, doc)),
        }
    }
}

impl FieldOp {
    fn eval(&self, found: Option<&Value>) -> bool {
        match self {
            FieldOp::Eq(expected) => equals(found, expected),
            FieldOp::Ne(expected) => !equals(found, expected),
            FieldOp::Exists(wanted) => found.is_some() == *wanted,
            FieldOp::IsNan => {
                matches!(found, Some(Value::Null))
                    || found.and_then(Value::as_str) == Some(NAN_SENTINEL)
            }
            FieldOp::Lt(bound) => {
                found.is_some_and(|v| compare(v, bound) == Some(std::cmp::Ordering::Less))
            }
            FieldOp::Gte(bound) => found.is_some_and(|v| {
                matches!(
                    compare(v, bound),
                    Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
                )
            }),
            FieldOp::In(candidates) => candidates.iter().any(|c| equals(found, c)),
        }
    }
}

/// 欠けたフィールドは `null` と等しい。配列はどれかの要素が等しければ一致
fn equals(found: Option<&Value>, expected: &Value) -> bool {
    match found {
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => items.contains(expected),
        Some(value) => value == expected,
    }
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn parse_entry(key: &str, value: &Value) -> Result<Predicate, QueryError> {
    match key {
        "$and" | "$or" => {
            let Value::Array(items) = value else {
                return Err(QueryError::InvalidOperand {
                    op: key.to_string(),
                    expected: "an array of patterns",
                });
            };
            let parts = items
                .iter()
                .map(Predicate::from_pattern)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(if key == "$and" {
                Predicate::And(parts)
            } else {
                Predicate::Or(parts)
            })
        }
        op if op.starts_with('$') => Err(QueryError::UnknownOperator(op.to_string())),
        "_id" => {
            let raw = value
                .as_str()
                .ok_or_else(|| QueryError::InvalidId(value.to_string()))?;
            let id = raw
                .parse::<ItemId>()
                .map_err(|_| QueryError::InvalidId(raw.to_string()))?;
            Ok(Predicate::id(id))
        }
        path => match value {
            Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => {
                parse_operators(path, ops)
            }
            plain => Ok(Predicate::eq(path, plain.clone())),
        },
    }
}

fn parse_operators(path: &str, ops: &Map<String, Value>) -> Result<Predicate, QueryError> {
    if !ops.keys().all(|k| k.starts_with('$')) {
        return Err(QueryError::MixedOperators(path.to_string()));
    }
    let mut parts = Vec::with_capacity(ops.len());
    for (op, operand) in ops {
        if op == "$elemMatch" {
            if !operand.is_object() {
                return Err(QueryError::InvalidOperand {
                    op: op.clone(),
                    expected: "a pattern object",
                });
            }
            parts.push(Predicate::any_element(path, Predicate::from_pattern(operand)?));
            continue;
        }
        let field_op = match op.as_str() {
            "$eq" => FieldOp::Eq(operand.clone()),
            "$ne" => FieldOp::Ne(operand.clone()),
            "$lt" => FieldOp::Lt(operand.clone()),
            "$gte" => FieldOp::Gte(operand.clone()),
            "$exists" => FieldOp::Exists(operand.as_bool().ok_or_else(|| {
                QueryError::InvalidOperand {
                    op: op.clone(),
                    expected: "a boolean",
                }
            })?),
            "$in" => match operand {
                Value::Array(values) => FieldOp::In(values.clone()),
                _ => {
                    return Err(QueryError::InvalidOperand {
                        op: op.clone(),
                        expected: "an array",
                    });
                }
            },
            "$nan" => FieldOp::IsNan,
            other => return Err(QueryError::UnknownOperator(other.to_string())),
        };
        parts.push(Predicate::field(path, field_op));
    }
    Ok(match parts.len() {
        1 => parts.remove(0),
        _ => Predicate::And(parts),
    })
}
