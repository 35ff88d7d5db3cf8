use std::cmp::Ordering;
use std::fmt;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::types::{LogicalType, StructField};

/// An owned scalar value.
///
/// Values appear at the edges of the engine: constants inside filters,
/// single-cell reads, statistics bounds, and index keys. Bulk data never
/// moves as `Value`s; it moves as [`crate::Vector`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Int128(i128),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    UInt128(u128),
    Float32(f32),
    Float64(f64),
    String(String),
    Blob(Vec<u8>),
    /// Microseconds since the Unix epoch.
    Timestamp(i64),
    Decimal {
        value: i128,
        width: u8,
        scale: u8,
    },
    List(Vec<Value>),
    Struct(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The logical type this value carries.
    ///
    /// Nested values recurse: a list takes its element type from its first
    /// element (`Null` when empty), and struct fields are typed per value.
    /// Values do not carry field names, so struct fields are named
    /// positionally (`f0`, `f1`, ...).
    pub fn logical_type(&self) -> LogicalType {
        match self {
            Value::Null => LogicalType::Null,
            Value::Boolean(_) => LogicalType::Boolean,
            Value::Int8(_) => LogicalType::Int8,
            Value::Int16(_) => LogicalType::Int16,
            Value::Int32(_) => LogicalType::Int32,
            Value::Int64(_) => LogicalType::Int64,
            Value::Int128(_) => LogicalType::Int128,
            Value::UInt8(_) => LogicalType::UInt8,
            Value::UInt16(_) => LogicalType::UInt16,
            Value::UInt32(_) => LogicalType::UInt32,
            Value::UInt64(_) => LogicalType::UInt64,
            Value::UInt128(_) => LogicalType::UInt128,
            Value::Float32(_) => LogicalType::Float32,
            Value::Float64(_) => LogicalType::Float64,
            Value::String(_) => LogicalType::String,
            Value::Blob(_) => LogicalType::Blob,
            Value::Timestamp(_) => LogicalType::Timestamp,
            Value::Decimal { width, scale, .. } => LogicalType::Decimal {
                width: *width,
                scale: *scale,
            },
            Value::List(values) => LogicalType::List(Box::new(
                values
                    .first()
                    .map(Value::logical_type)
                    .unwrap_or(LogicalType::Null),
            )),
            Value::Struct(values) => LogicalType::Struct(
                values
                    .iter()
                    .enumerate()
                    .map(|(i, value)| StructField {
                        name: format!("f{i}"),
                        ty: value.logical_type(),
                    })
                    .collect(),
            ),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int8(v) => Some(v as i64),
            Value::Int16(v) => Some(v as i64),
            Value::Int32(v) => Some(v as i64),
            Value::Int64(v) | Value::Timestamp(v) => Some(v),
            Value::UInt8(v) => Some(v as i64),
            Value::UInt16(v) => Some(v as i64),
            Value::UInt32(v) => Some(v as i64),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::UInt8(v) => Some(v as u64),
            Value::UInt16(v) => Some(v as u64),
            Value::UInt32(v) => Some(v as u64),
            Value::UInt64(v) => Some(v),
            Value::Int8(v) if v >= 0 => Some(v as u64),
            Value::Int16(v) if v >= 0 => Some(v as u64),
            Value::Int32(v) if v >= 0 => Some(v as u64),
            Value::Int64(v) if v >= 0 => Some(v as u64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float32(v) => Some(v as f64),
            Value::Float64(v) => Some(v),
            Value::Int8(v) => Some(v as f64),
            Value::Int16(v) => Some(v as f64),
            Value::Int32(v) => Some(v as f64),
            Value::Int64(v) => Some(v as f64),
            Value::UInt8(v) => Some(v as f64),
            Value::UInt16(v) => Some(v as f64),
            Value::UInt32(v) => Some(v as f64),
            Value::UInt64(v) => Some(v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Total order across comparable values of the same family.
    ///
    /// Integers of any width compare numerically against each other and
    /// against floats; strings compare lexicographically. `None` for
    /// incomparable pairs (nulls, nested values, mixed families).
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        use Value::*;
        match (self, other) {
            (Null, _) | (_, Null) => None,
            (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
            (String(a), String(b)) => Some(a.cmp(b)),
            (Blob(a), Blob(b)) => Some(a.cmp(b)),
            (Int128(a), Int128(b)) => Some(a.cmp(b)),
            (UInt128(a), UInt128(b)) => Some(a.cmp(b)),
            (Decimal { value: a, .. }, Decimal { value: b, .. }) => Some(a.cmp(b)),
            (a, b) => {
                if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
                    return Some(x.cmp(&y));
                }
                if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
                    return Some(x.cmp(&y));
                }
                if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
                    return Some(OrderedFloat(x).cmp(&OrderedFloat(y)));
                }
                None
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Int8(v) => write!(f, "{v}"),
            Value::Int16(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Int128(v) => write!(f, "{v}"),
            Value::UInt8(v) => write!(f, "{v}"),
            Value::UInt16(v) => write!(f, "{v}"),
            Value::UInt32(v) => write!(f, "{v}"),
            Value::UInt64(v) => write!(f, "{v}"),
            Value::UInt128(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v}"),
            Value::Blob(v) => write!(f, "<blob {} bytes>", v.len()),
            Value::Timestamp(v) => write!(f, "ts({v})"),
            Value::Decimal { value, scale, .. } => write!(f, "dec({value}e-{scale})"),
            Value::List(v) => write!(f, "<list {} values>", v.len()),
            Value::Struct(v) => write!(f, "<struct {} fields>", v.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{Arbitrary, Gen, QuickCheck};

    impl Arbitrary for Value {
        fn arbitrary(g: &mut Gen) -> Self {
            // 128-bit variants are left out: msgpack has no native 128-bit
            // integer representation
            fn scalar(g: &mut Gen) -> Value {
                match u8::arbitrary(g) % 10 {
                    0 => Value::Null,
                    1 => Value::Boolean(bool::arbitrary(g)),
                    2 => Value::Int16(i16::arbitrary(g)),
                    3 => Value::Int32(i32::arbitrary(g)),
                    4 => Value::Int64(i64::arbitrary(g)),
                    5 => Value::UInt64(u64::arbitrary(g)),
                    6 => {
                        let f = f64::arbitrary(g);
                        Value::Float64(if f.is_nan() { 0.0 } else { f })
                    }
                    7 => Value::String(String::arbitrary(g)),
                    8 => Value::Blob(Vec::arbitrary(g)),
                    _ => Value::Timestamp(i64::arbitrary(g)),
                }
            }
            match u8::arbitrary(g) % 12 {
                10 => Value::List((0..usize::arbitrary(g) % 4).map(|_| scalar(g)).collect()),
                11 => Value::Struct(
                    (0..1 + usize::arbitrary(g) % 3).map(|_| scalar(g)).collect(),
                ),
                _ => scalar(g),
            }
        }
    }

    #[test]
    fn msgpack_round_trip_holds_for_arbitrary_values() {
        fn prop(values: Vec<Value>) -> bool {
            let Ok(bytes) = rmp_serde::to_vec(&values) else {
                return false;
            };
            rmp_serde::from_slice::<Vec<Value>>(&bytes)
                .map(|back| back == values)
                .unwrap_or(false)
        }
        QuickCheck::new()
            .tests(200)
            .quickcheck(prop as fn(Vec<Value>) -> bool);
    }

    #[test]
    fn compare_is_antisymmetric() {
        fn prop(a: Value, b: Value) -> bool {
            match (a.compare(&b), b.compare(&a)) {
                (Some(x), Some(y)) => x == y.reverse(),
                (None, None) => true,
                _ => false,
            }
        }
        QuickCheck::new()
            .tests(500)
            .quickcheck(prop as fn(Value, Value) -> bool);
    }

    #[test]
    fn cross_width_integer_compare() {
        assert_eq!(
            Value::Int32(5).compare(&Value::Int64(7)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::UInt8(200).compare(&Value::Int64(100)),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn float_compare_is_total() {
        assert_eq!(
            Value::Float64(1.5).compare(&Value::Int32(1)),
            Some(Ordering::Greater)
        );
        assert_eq!(
            Value::Float64(f64::NAN).compare(&Value::Float64(f64::NAN)),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn null_is_incomparable() {
        assert_eq!(Value::Null.compare(&Value::Int64(1)), None);
        assert!(Value::Null.is_null());
    }

    #[test]
    fn logical_type_of_nested_values() {
        let list = Value::List(vec![Value::Int32(1), Value::Int32(2)]);
        assert_eq!(
            list.logical_type(),
            LogicalType::List(Box::new(LogicalType::Int32))
        );
        assert_eq!(
            Value::List(vec![]).logical_type(),
            LogicalType::List(Box::new(LogicalType::Null))
        );

        let value = Value::Struct(vec![Value::Int64(1), Value::String("x".into())]);
        match value.logical_type() {
            LogicalType::Struct(fields) => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0].name, "f0");
                assert_eq!(fields[0].ty, LogicalType::Int64);
                assert_eq!(fields[1].ty, LogicalType::String);
            }
            other => panic!("expected a struct type, got {other:?}"),
        }
    }
}
