use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::types::{LogicalType, PhysicalType};
use crate::validity::Validity;
use crate::value::Value;

#[derive(Debug, Snafu, PartialEq)]
pub enum VectorError {
    #[snafu(display("value {value} cannot be stored in a {ty:?} vector"))]
    TypeMismatch { ty: PhysicalType, value: String },
    #[snafu(display("row {row} out of bounds for vector of length {len}"))]
    OutOfBounds { row: usize, len: usize },
}

/// Typed storage of one vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VectorBuffer {
    Bool(Vec<bool>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Int128(Vec<i128>),
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    UInt128(Vec<u128>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Varchar(Vec<String>),
    Blob(Vec<Vec<u8>>),
    /// `offsets[i]` is the cumulative end offset of row `i` in the child.
    List { offsets: Vec<u64>, child: Box<Vector> },
    /// Row `i` owns child rows `[i * arity, (i + 1) * arity)`.
    Array { child: Box<Vector>, arity: usize },
    Struct(Vec<Vector>),
}

macro_rules! scalar_buffer_len {
    ($buf:expr) => {
        match $buf {
            VectorBuffer::Bool(v) => v.len(),
            VectorBuffer::Int8(v) => v.len(),
            VectorBuffer::Int16(v) => v.len(),
            VectorBuffer::Int32(v) => v.len(),
            VectorBuffer::Int64(v) => v.len(),
            VectorBuffer::Int128(v) => v.len(),
            VectorBuffer::UInt8(v) => v.len(),
            VectorBuffer::UInt16(v) => v.len(),
            VectorBuffer::UInt32(v) => v.len(),
            VectorBuffer::UInt64(v) => v.len(),
            VectorBuffer::UInt128(v) => v.len(),
            VectorBuffer::Float32(v) => v.len(),
            VectorBuffer::Float64(v) => v.len(),
            VectorBuffer::Varchar(v) => v.len(),
            VectorBuffer::Blob(v) => v.len(),
            VectorBuffer::List { offsets, .. } => offsets.len(),
            VectorBuffer::Array { child, arity } => {
                if *arity == 0 {
                    0
                } else {
                    child.len() / *arity
                }
            }
            VectorBuffer::Struct(fields) => fields.first().map(|f| f.len()).unwrap_or(0),
        }
    };
}

impl VectorBuffer {
    fn for_type(ty: &LogicalType, capacity: usize) -> VectorBuffer {
        match ty {
            LogicalType::List(elem) => VectorBuffer::List {
                offsets: Vec::with_capacity(capacity),
                child: Box::new(Vector::with_capacity(elem.as_ref().clone(), capacity)),
            },
            LogicalType::Array { element, arity } => VectorBuffer::Array {
                child: Box::new(Vector::with_capacity(
                    element.as_ref().clone(),
                    capacity * arity,
                )),
                arity: *arity,
            },
            LogicalType::Struct(fields) => VectorBuffer::Struct(
                fields
                    .iter()
                    .map(|f| Vector::with_capacity(f.ty.clone(), capacity))
                    .collect(),
            ),
            other => match other.physical_type() {
                PhysicalType::Bool => VectorBuffer::Bool(Vec::with_capacity(capacity)),
                PhysicalType::Int8 => VectorBuffer::Int8(Vec::with_capacity(capacity)),
                PhysicalType::Int16 => VectorBuffer::Int16(Vec::with_capacity(capacity)),
                PhysicalType::Int32 => VectorBuffer::Int32(Vec::with_capacity(capacity)),
                PhysicalType::Int64 => VectorBuffer::Int64(Vec::with_capacity(capacity)),
                PhysicalType::Int128 => VectorBuffer::Int128(Vec::with_capacity(capacity)),
                PhysicalType::UInt8 => VectorBuffer::UInt8(Vec::with_capacity(capacity)),
                PhysicalType::UInt16 => VectorBuffer::UInt16(Vec::with_capacity(capacity)),
                PhysicalType::UInt32 => VectorBuffer::UInt32(Vec::with_capacity(capacity)),
                PhysicalType::UInt64 => VectorBuffer::UInt64(Vec::with_capacity(capacity)),
                PhysicalType::UInt128 => VectorBuffer::UInt128(Vec::with_capacity(capacity)),
                PhysicalType::Float32 => VectorBuffer::Float32(Vec::with_capacity(capacity)),
                PhysicalType::Float64 => VectorBuffer::Float64(Vec::with_capacity(capacity)),
                PhysicalType::Varchar => VectorBuffer::Varchar(Vec::with_capacity(capacity)),
                PhysicalType::Blob
                | PhysicalType::Invalid
                | PhysicalType::List
                | PhysicalType::Array
                | PhysicalType::Struct => VectorBuffer::Blob(Vec::with_capacity(capacity)),
            },
        }
    }
}

/// A fixed-capacity, column-oriented buffer of one logical type with an
/// explicit validity bitmap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    ty: LogicalType,
    validity: Validity,
    buffer: VectorBuffer,
}

impl Vector {
    pub fn new(ty: LogicalType) -> Self {
        Self::with_capacity(ty, crate::VECTOR_CAPACITY)
    }

    pub fn with_capacity(ty: LogicalType, capacity: usize) -> Self {
        let buffer = VectorBuffer::for_type(&ty, capacity);
        Vector {
            ty,
            validity: Validity::new(0),
            buffer,
        }
    }

    pub fn logical_type(&self) -> &LogicalType {
        &self.ty
    }

    pub fn physical_type(&self) -> PhysicalType {
        self.ty.physical_type()
    }

    pub fn len(&self) -> usize {
        scalar_buffer_len!(&self.buffer)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn validity(&self) -> &Validity {
        &self.validity
    }

    pub fn validity_mut(&mut self) -> &mut Validity {
        &mut self.validity
    }

    pub fn buffer(&self) -> &VectorBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut VectorBuffer {
        &mut self.buffer
    }

    pub fn row_is_valid(&self, row: usize) -> bool {
        self.validity.row_is_valid(row)
    }

    /// Append one value, extending the validity bitmap.
    pub fn push(&mut self, value: Value) -> Result<(), VectorError> {
        let row = self.len();
        self.push_default();
        if value.is_null() {
            self.validity.set_invalid(row);
            return Ok(());
        }
        self.write_cell(row, value)
    }

    /// Overwrite row `row`, which must already exist.
    pub fn set_value(&mut self, row: usize, value: Value) -> Result<(), VectorError> {
        let len = self.len();
        if row >= len {
            return Err(VectorError::OutOfBounds { row, len });
        }
        if value.is_null() {
            self.validity.set_invalid(row);
            return Ok(());
        }
        self.validity.set_valid(row);
        self.write_cell(row, value)
    }

    /// Read row `row` back as an owned value; NULL rows yield `Value::Null`.
    pub fn value(&self, row: usize) -> Value {
        if row >= self.len() || !self.validity.row_is_valid(row) {
            return Value::Null;
        }
        match &self.buffer {
            VectorBuffer::Bool(v) => Value::Boolean(v[row]),
            VectorBuffer::Int8(v) => Value::Int8(v[row]),
            VectorBuffer::Int16(v) => Value::Int16(v[row]),
            VectorBuffer::Int32(v) => Value::Int32(v[row]),
            VectorBuffer::Int64(v) => match self.ty {
                LogicalType::Timestamp => Value::Timestamp(v[row]),
                _ => Value::Int64(v[row]),
            },
            VectorBuffer::Int128(v) => match self.ty {
                LogicalType::Decimal { width, scale } => Value::Decimal {
                    value: v[row],
                    width,
                    scale,
                },
                _ => Value::Int128(v[row]),
            },
            VectorBuffer::UInt8(v) => Value::UInt8(v[row]),
            VectorBuffer::UInt16(v) => Value::UInt16(v[row]),
            VectorBuffer::UInt32(v) => Value::UInt32(v[row]),
            VectorBuffer::UInt64(v) => Value::UInt64(v[row]),
            VectorBuffer::UInt128(v) => Value::UInt128(v[row]),
            VectorBuffer::Float32(v) => Value::Float32(v[row]),
            VectorBuffer::Float64(v) => Value::Float64(v[row]),
            VectorBuffer::Varchar(v) => Value::String(v[row].clone()),
            VectorBuffer::Blob(v) => Value::Blob(v[row].clone()),
            VectorBuffer::List { offsets, child } => {
                let end = offsets[row] as usize;
                let start = if row == 0 { 0 } else { offsets[row - 1] as usize };
                Value::List((start..end).map(|i| child.value(i)).collect())
            }
            VectorBuffer::Array { child, arity } => {
                let start = row * arity;
                Value::List((start..start + arity).map(|i| child.value(i)).collect())
            }
            VectorBuffer::Struct(fields) => {
                Value::Struct(fields.iter().map(|f| f.value(row)).collect())
            }
        }
    }

    /// Append `count` rows from `other` starting at `offset`.
    pub fn append_range(
        &mut self,
        other: &Vector,
        offset: usize,
        count: usize,
    ) -> Result<(), VectorError> {
        for row in offset..offset + count {
            self.push(other.value(row))?;
        }
        Ok(())
    }

    fn push_default(&mut self) {
        match &mut self.buffer {
            VectorBuffer::Bool(v) => v.push(false),
            VectorBuffer::Int8(v) => v.push(0),
            VectorBuffer::Int16(v) => v.push(0),
            VectorBuffer::Int32(v) => v.push(0),
            VectorBuffer::Int64(v) => v.push(0),
            VectorBuffer::Int128(v) => v.push(0),
            VectorBuffer::UInt8(v) => v.push(0),
            VectorBuffer::UInt16(v) => v.push(0),
            VectorBuffer::UInt32(v) => v.push(0),
            VectorBuffer::UInt64(v) => v.push(0),
            VectorBuffer::UInt128(v) => v.push(0),
            VectorBuffer::Float32(v) => v.push(0.0),
            VectorBuffer::Float64(v) => v.push(0.0),
            VectorBuffer::Varchar(v) => v.push(String::new()),
            VectorBuffer::Blob(v) => v.push(Vec::new()),
            VectorBuffer::List { offsets, .. } => {
                let end = offsets.last().copied().unwrap_or(0);
                offsets.push(end);
            }
            VectorBuffer::Array { child, arity } => {
                let arity = *arity;
                for _ in 0..arity {
                    let _ = child.push(Value::Null);
                }
            }
            VectorBuffer::Struct(fields) => {
                for field in fields {
                    let _ = field.push(Value::Null);
                }
            }
        }
        let len = self.len();
        self.validity.resize(len);
    }

    fn write_cell(&mut self, row: usize, value: Value) -> Result<(), VectorError> {
        macro_rules! store {
            ($slot:expr, $conv:expr) => {
                match $conv {
                    Some(v) => {
                        $slot = v;
                        Ok(())
                    }
                    None => Err(VectorError::TypeMismatch {
                        ty: self.ty.physical_type(),
                        value: value.to_string(),
                    }),
                }
            };
        }
        match &mut self.buffer {
            VectorBuffer::Bool(v) => store!(
                v[row],
                match value {
                    Value::Boolean(b) => Some(b),
                    _ => None,
                }
            ),
            VectorBuffer::Int8(v) =>

                store!(v[row], value.as_i64().and_then(|x| i8::try_from(x).ok())),
            VectorBuffer::Int16(v) =>
                store!(v[row], value.as_i64().and_then(|x| i16::try_from(x).ok())),
            VectorBuffer::Int32(v) =>
                store!(v[row], value.as_i64().and_then(|x| i32::try_from(x).ok())),
            VectorBuffer::Int64(v) => store!(v[row], value.as_i64()),
            VectorBuffer::Int128(v) => store!(
                v[row],
                match value {
                    Value::Int128(x) => Some(x),
                    Value::Decimal { value: x, .. } => Some(x),
                    ref other => other.as_i64().map(|x| x as i128),
                }
            ),
            VectorBuffer::UInt8(v) =>
                store!(v[row], value.as_u64().and_then(|x| u8::try_from(x).ok())),
            VectorBuffer::UInt16(v) =>
                store!(v[row], value.as_u64().and_then(|x| u16::try_from(x).ok())),
            VectorBuffer::UInt32(v) =>
                store!(v[row], value.as_u64().and_then(|x| u32::try_from(x).ok())),
            VectorBuffer::UInt64(v) => store!(v[row], value.as_u64()),
            VectorBuffer::UInt128(v) => store!(
                v[row],
                match value {
                    Value::UInt128(x) => Some(x),
                    ref other => other.as_u64().map(|x| x as u128),
                }
            ),
            VectorBuffer::Float32(v) => store!(v[row], value.as_f64().map(|x| x as f32)),
            VectorBuffer::Float64(v) => store!(v[row], value.as_f64()),
            VectorBuffer::Varchar(v) => store!(
                v[row],
                match value {
                    Value::String(ref s) => Some(s.clone()),
                    _ => None,
                }
            ),
            VectorBuffer::Blob(v) => store!(
                v[row],
                match value {
                    Value::Blob(ref b) => Some(b.clone()),
                    _ => None,
                }
            ),
            VectorBuffer::List { offsets, child } => match value {
                Value::List(values) => {
                    // lists are append-only: only the freshly pushed tail row
                    // may be written
                    debug_assert_eq!(row + 1, offsets.len());
                    let start = if row == 0 { 0 } else { offsets[row - 1] };
                    let count = values.len() as u64;
                    for v in values {
                        child.push(v).map_err(|_| VectorError::TypeMismatch {
                            ty: PhysicalType::List,
                            value: "list element".into(),
                        })?;
                    }
                    offsets[row] = start + count;
                    Ok(())
                }
                other => Err(VectorError::TypeMismatch {
                    ty: PhysicalType::List,
                    value: other.to_string(),
                }),
            },
            VectorBuffer::Array { child, arity } => match value {
                Value::List(values) if values.len() == *arity => {
                    let start = row * *arity;
                    for (i, v) in values.into_iter().enumerate() {
                        child.set_value(start + i, v)?;
                    }
                    Ok(())
                }
                other => Err(VectorError::TypeMismatch {
                    ty: PhysicalType::Array,
                    value: other.to_string(),
                }),
            },
            VectorBuffer::Struct(fields) => match value {
                Value::Struct(values) if values.len() == fields.len() => {
                    for (field, v) in fields.iter_mut().zip(values) {
                        field.set_value(row, v)?;
                    }
                    Ok(())
                }
                other => Err(VectorError::TypeMismatch {
                    ty: PhysicalType::Struct,
                    value: other.to_string(),
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StructField;

    #[test]
    fn push_and_read_scalars() {
        let mut v = Vector::new(LogicalType::Int64);
        v.push(Value::Int64(10)).unwrap();
        v.push(Value::Null).unwrap();
        v.push(Value::Int32(7)).unwrap();
        assert_eq!(v.len(), 3);
        assert_eq!(v.value(0), Value::Int64(10));
        assert_eq!(v.value(1), Value::Null);
        assert_eq!(v.value(2), Value::Int64(7));
    }

    #[test]
    fn timestamp_round_trips_through_int64_buffer() {
        let mut v = Vector::new(LogicalType::Timestamp);
        v.push(Value::Timestamp(123_456)).unwrap();
        assert_eq!(v.value(0), Value::Timestamp(123_456));
        assert!(matches!(v.buffer(), VectorBuffer::Int64(_)));
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let mut v = Vector::new(LogicalType::String);
        assert!(v.push(Value::Int64(1)).is_err());
    }

    #[test]
    fn list_vector() {
        let mut v = Vector::new(LogicalType::List(Box::new(LogicalType::Int32)));
        v.push(Value::List(vec![Value::Int32(1), Value::Int32(2)]))
            .unwrap();
        v.push(Value::List(vec![])).unwrap();
        v.push(Value::List(vec![Value::Int32(3)])).unwrap();
        assert_eq!(
            v.value(0),
            Value::List(vec![Value::Int32(1), Value::Int32(2)])
        );
        assert_eq!(v.value(1), Value::List(vec![]));
        assert_eq!(v.value(2), Value::List(vec![Value::Int32(3)]));
    }

    #[test]
    fn struct_vector_shares_row_count() {
        let ty = LogicalType::Struct(vec![
            StructField {
                name: "a".into(),
                ty: LogicalType::Int64,
            },
            StructField {
                name: "b".into(),
                ty: LogicalType::String,
            },
        ]);
        let mut v = Vector::new(ty);
        v.push(Value::Struct(vec![
            Value::Int64(1),
            Value::String("x".into()),
        ]))
        .unwrap();
        assert_eq!(
            v.value(0),
            Value::Struct(vec![Value::Int64(1), Value::String("x".into())])
        );
    }

    #[test]
    fn array_vector_fixed_arity() {
        let ty = LogicalType::Array {
            element: Box::new(LogicalType::Int32),
            arity: 2,
        };
        let mut v = Vector::new(ty);
        v.push(Value::List(vec![Value::Int32(1), Value::Int32(2)]))
            .unwrap();
        assert!(v
            .push(Value::List(vec![Value::Int32(1)]))
            .is_err());
        assert_eq!(
            v.value(0),
            Value::List(vec![Value::Int32(1), Value::Int32(2)])
        );
    }
}
