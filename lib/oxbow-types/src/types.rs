use serde::{Deserialize, Serialize};

/// A named field of a struct type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub ty: LogicalType,
}

/// Logical type of a column or value.
///
/// The logical type is what the user sees; the [`PhysicalType`] is what the
/// column store lays out in memory and on disk. Several logical types share
/// one physical representation (timestamps are `Int64`, decimals `Int128`,
/// enums `UInt32`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    UInt128,
    Float32,
    Float64,
    String,
    Blob,
    /// Microseconds since the Unix epoch.
    Timestamp,
    Decimal {
        width: u8,
        scale: u8,
    },
    List(Box<LogicalType>),
    /// Fixed-arity list: every row owns exactly `arity` child values.
    Array {
        element: Box<LogicalType>,
        arity: usize,
    },
    Struct(Vec<StructField>),
    Enum(Vec<String>),
    Null,
}

impl LogicalType {
    pub fn physical_type(&self) -> PhysicalType {
        match self {
            LogicalType::Boolean => PhysicalType::Bool,
            LogicalType::Int8 => PhysicalType::Int8,
            LogicalType::Int16 => PhysicalType::Int16,
            LogicalType::Int32 => PhysicalType::Int32,
            LogicalType::Int64 | LogicalType::Timestamp => PhysicalType::Int64,
            LogicalType::Int128 | LogicalType::Decimal { .. } => PhysicalType::Int128,
            LogicalType::UInt8 => PhysicalType::UInt8,
            LogicalType::UInt16 => PhysicalType::UInt16,
            LogicalType::UInt32 | LogicalType::Enum(_) => PhysicalType::UInt32,
            LogicalType::UInt64 => PhysicalType::UInt64,
            LogicalType::UInt128 => PhysicalType::UInt128,
            LogicalType::Float32 => PhysicalType::Float32,
            LogicalType::Float64 => PhysicalType::Float64,
            LogicalType::String => PhysicalType::Varchar,
            LogicalType::Blob => PhysicalType::Blob,
            LogicalType::List(_) => PhysicalType::List,
            LogicalType::Array { .. } => PhysicalType::Array,
            LogicalType::Struct(_) => PhysicalType::Struct,
            LogicalType::Null => PhysicalType::Invalid,
        }
    }

    /// Whether values of this type have a total order usable for statistics
    /// and index keys.
    pub fn is_orderable(&self) -> bool {
        !matches!(
            self,
            LogicalType::List(_)
                | LogicalType::Array { .. }
                | LogicalType::Struct(_)
                | LogicalType::Blob
                | LogicalType::Null
        )
    }

    pub fn is_nested(&self) -> bool {
        matches!(
            self,
            LogicalType::List(_) | LogicalType::Array { .. } | LogicalType::Struct(_)
        )
    }
}

/// Physical layout of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhysicalType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    UInt128,
    Float32,
    Float64,
    Varchar,
    Blob,
    List,
    Array,
    Struct,
    Invalid,
}

impl PhysicalType {
    /// Size in bytes of one value, for fixed-width types.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            PhysicalType::Bool | PhysicalType::Int8 | PhysicalType::UInt8 => Some(1),
            PhysicalType::Int16 | PhysicalType::UInt16 => Some(2),
            PhysicalType::Int32 | PhysicalType::UInt32 | PhysicalType::Float32 => Some(4),
            PhysicalType::Int64 | PhysicalType::UInt64 | PhysicalType::Float64 => Some(8),
            PhysicalType::Int128 | PhysicalType::UInt128 => Some(16),
            PhysicalType::Varchar
            | PhysicalType::Blob
            | PhysicalType::List
            | PhysicalType::Array
            | PhysicalType::Struct
            | PhysicalType::Invalid => None,
        }
    }

    pub fn is_fixed_width(self) -> bool {
        self.fixed_size().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_mapping_shares_representations() {
        assert_eq!(LogicalType::Timestamp.physical_type(), PhysicalType::Int64);
        assert_eq!(
            LogicalType::Decimal { width: 18, scale: 3 }.physical_type(),
            PhysicalType::Int128
        );
        assert_eq!(
            LogicalType::Enum(vec!["a".into(), "b".into()]).physical_type(),
            PhysicalType::UInt32
        );
    }

    #[test]
    fn fixed_sizes() {
        assert_eq!(PhysicalType::Int64.fixed_size(), Some(8));
        assert_eq!(PhysicalType::UInt128.fixed_size(), Some(16));
        assert_eq!(PhysicalType::Varchar.fixed_size(), None);
        assert!(!PhysicalType::List.is_fixed_width());
    }

    #[test]
    fn orderability() {
        assert!(LogicalType::Int32.is_orderable());
        assert!(LogicalType::String.is_orderable());
        assert!(!LogicalType::List(Box::new(LogicalType::Int32)).is_orderable());
        assert!(!LogicalType::Blob.is_orderable());
    }
}
