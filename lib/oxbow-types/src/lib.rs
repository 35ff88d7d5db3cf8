//! Core value, vector, and filter types shared by every oxbow crate.
//!
//! The storage engine is column-oriented: scalar [`Value`]s exist at the
//! edges (constants in filters, single-cell access), while bulk data moves
//! through [`Vector`]s (one typed column buffer with a validity bitmap) and
//! [`DataChunk`]s (a set of vectors sharing a cardinality).

#![deny(warnings)]

mod chunk;
mod filter;
mod types;
mod validity;
mod value;
mod vector;

pub use chunk::DataChunk;
pub use filter::{CompareOp, FilterPropagation, TableFilter};
pub use types::{LogicalType, PhysicalType, StructField};
pub use validity::Validity;
pub use value::Value;
pub use vector::{Vector, VectorBuffer, VectorError};

/// Capacity of one vector, and therefore of one row group.
pub const VECTOR_CAPACITY: usize = 1024;

/// Row identifier: dense, assigned monotonically per table at append time.
pub type RowId = u64;
