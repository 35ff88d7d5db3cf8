use std::cmp::Ordering;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use oxbow_types::Value;

/// A totally ordered index key.
///
/// [`Value::compare`] only orders within one type family; an index must
/// order every key against every other, so incomparable families fall back
/// to a fixed rank. NULL sorts before everything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexKey(pub Value);

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0.is_null(), other.0.is_null()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }
        if let Some(ordering) = self.0.compare(&other.0) {
            return ordering;
        }
        let by_rank = rank(&self.0).cmp(&rank(&other.0));
        if by_rank != Ordering::Equal {
            return by_rank;
        }
        // same rank but incomparable (nested values): order by encoding
        let left = rmp_serde::to_vec(&self.0).unwrap_or_default();
        let right = rmp_serde::to_vec(&other.0).unwrap_or_default();
        left.cmp(&right)
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Boolean(_) => 1,
        Value::Int8(_)
        | Value::Int16(_)
        | Value::Int32(_)
        | Value::Int64(_)
        | Value::Int128(_)
        | Value::UInt8(_)
        | Value::UInt16(_)
        | Value::UInt32(_)
        | Value::UInt64(_)
        | Value::UInt128(_)
        | Value::Float32(_)
        | Value::Float64(_)
        | Value::Decimal { .. } => 2,
        Value::Timestamp(_) => 3,
        Value::String(_) => 4,
        Value::Blob(_) => 5,
        Value::List(_) => 6,
        Value::Struct(_) => 7,
    }
}

impl IndexKey {
    /// Smallest possible key.
    pub fn min() -> Self {
        IndexKey(Value::Null)
    }
}

impl From<Value> for IndexKey {
    fn from(value: Value) -> Self {
        // normalize floats so equal keys hash and compare consistently
        match value {
            Value::Float32(f) => IndexKey(Value::Float64(OrderedFloat(f as f64).0)),
            other => IndexKey(other),
        }
    }
}
