use serde::{Deserialize, Serialize};

use crate::types::LogicalType;
use crate::value::Value;
use crate::vector::{Vector, VectorError};

/// An ordered set of vectors sharing one cardinality: the unit of data flow
/// between operators and the storage layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataChunk {
    columns: Vec<Vector>,
    cardinality: usize,
}

impl DataChunk {
    pub fn new(types: &[LogicalType]) -> Self {
        DataChunk {
            columns: types.iter().map(|t| Vector::new(t.clone())).collect(),
            cardinality: 0,
        }
    }

    pub fn empty() -> Self {
        DataChunk {
            columns: Vec::new(),
            cardinality: 0,
        }
    }

    pub fn from_columns(columns: Vec<Vector>) -> Self {
        let cardinality = columns.first().map(|c| c.len()).unwrap_or(0);
        debug_assert!(columns.iter().all(|c| c.len() == cardinality));
        DataChunk {
            columns,
            cardinality,
        }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn cardinality(&self) -> usize {
        self.cardinality
    }

    pub fn is_empty(&self) -> bool {
        self.cardinality == 0
    }

    pub fn set_cardinality(&mut self, cardinality: usize) {
        debug_assert!(self
            .columns
            .iter()
            .all(|c| c.len() >= cardinality));
        self.cardinality = cardinality;
    }

    pub fn types(&self) -> Vec<LogicalType> {
        self.columns
            .iter()
            .map(|c| c.logical_type().clone())
            .collect()
    }

    pub fn column(&self, idx: usize) -> &Vector {
        &self.columns[idx]
    }

    pub fn column_mut(&mut self, idx: usize) -> &mut Vector {
        &mut self.columns[idx]
    }

    pub fn columns(&self) -> &[Vector] {
        &self.columns
    }

    pub fn value(&self, column: usize, row: usize) -> Value {
        self.columns[column].value(row)
    }

    /// Append one full row; every column receives one value.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), VectorError> {
        debug_assert_eq!(row.len(), self.columns.len());
        for (column, value) in self.columns.iter_mut().zip(row) {
            column.push(value)?;
        }
        self.cardinality += 1;
        Ok(())
    }

    /// Append row `row` of `other` to this chunk.
    pub fn append_row_from(&mut self, other: &DataChunk, row: usize) -> Result<(), VectorError> {
        for (dst, src) in self.columns.iter_mut().zip(&other.columns) {
            dst.push(src.value(row))?;
        }
        self.cardinality += 1;
        Ok(())
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<Value>> + '_ {
        (0..self.cardinality).map(move |row| {
            self.columns
                .iter()
                .map(|column| column.value(row))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_rows_and_read_back() {
        let mut chunk = DataChunk::new(&[LogicalType::Int64, LogicalType::String]);
        chunk
            .push_row(vec![Value::Int64(1), Value::String("one".into())])
            .unwrap();
        chunk
            .push_row(vec![Value::Int64(2), Value::String("two".into())])
            .unwrap();
        assert_eq!(chunk.cardinality(), 2);
        assert_eq!(chunk.value(0, 1), Value::Int64(2));
        assert_eq!(chunk.value(1, 0), Value::String("one".into()));
    }

    #[test]
    fn wire_round_trip() {
        let mut chunk = DataChunk::new(&[LogicalType::Int64, LogicalType::Float64]);
        for i in 0..10 {
            chunk
                .push_row(vec![Value::Int64(i), Value::Float64(i as f64 * 1.5)])
                .unwrap();
        }
        let bytes = rmp_serde::to_vec(&chunk).unwrap();
        let back: DataChunk = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(chunk, back);
    }
}
