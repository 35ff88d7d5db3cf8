//! Sort operator.

use oxbow_index::IndexKey;
use oxbow_types::DataChunk;

use crate::error::{EngineError, ErrorCode, Result};
use crate::request::{SortDirection, SortKey};

/// Reorder rows by the given keys. Stable, so ties keep input order.
pub fn run_sort(input: &DataChunk, order: &[SortKey]) -> Result<DataChunk> {
    let rows: Vec<Vec<oxbow_types::Value>> = input.rows().collect();
    let mut indices: Vec<usize> = (0..rows.len()).collect();
    indices.sort_by(|&a, &b| {
        for key in order {
            let left = IndexKey::from(rows[a][key.column].clone());
            let right = IndexKey::from(rows[b][key.column].clone());
            let ordering = match key.direction {
                SortDirection::Ascending => left.cmp(&right),
                SortDirection::Descending => right.cmp(&left),
            };
            if ordering != std::cmp::Ordering::Equal {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });

    let mut output = DataChunk::new(&input.types());
    for idx in indices {
        output
            .push_row(rows[idx].clone())
            .map_err(|e| EngineError::new(ErrorCode::SchemaError, e.to_string()))?;
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxbow_types::{LogicalType, Value};

    fn chunk() -> DataChunk {
        let mut chunk = DataChunk::new(&[LogicalType::Int64, LogicalType::String]);
        for (v, s) in [(3, "c"), (1, "a"), (2, "b"), (1, "z")] {
            chunk
                .push_row(vec![Value::Int64(v), Value::String(s.into())])
                .unwrap();
        }
        chunk
    }

    #[test]
    fn ascending_with_stable_ties() {
        let out = run_sort(
            &chunk(),
            &[SortKey {
                column: 0,
                direction: SortDirection::Ascending,
            }],
        )
        .unwrap();
        let values: Vec<Value> = (0..4).map(|i| out.value(0, i)).collect();
        assert_eq!(
            values,
            vec![
                Value::Int64(1),
                Value::Int64(1),
                Value::Int64(2),
                Value::Int64(3)
            ]
        );
        // ties keep input order: "a" before "z"
        assert_eq!(out.value(1, 0), Value::String("a".into()));
        assert_eq!(out.value(1, 1), Value::String("z".into()));
    }

    #[test]
    fn descending_and_secondary_key() {
        let out = run_sort(
            &chunk(),
            &[
                SortKey {
                    column: 0,
                    direction: SortDirection::Ascending,
                },
                SortKey {
                    column: 1,
                    direction: SortDirection::Descending,
                },
            ],
        )
        .unwrap();
        assert_eq!(out.value(1, 0), Value::String("z".into()));
        assert_eq!(out.value(1, 1), Value::String("a".into()));
    }
}
