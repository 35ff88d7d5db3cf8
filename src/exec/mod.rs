//! Executor operators over the storage layer.
//!
//! Operators form a tree with at most two children per node. The leaves
//! read from storage (full scan, index scan, primary-key scan); the inner
//! nodes are CPU-only transforms (match, group, sort, distinct, limit) that
//! never touch disk. A select request composes
//! match -> group -> sort -> having -> distinct -> limit over one leaf.

pub mod aggregate;
pub mod sort;

use std::collections::BTreeSet;

use tracing::trace;

use oxbow_index::{IndexEngine, IndexKey};
use oxbow_storage::{DataTable, Snapshot};
use oxbow_types::{DataChunk, LogicalType, RowId, TableFilter, Value};

use crate::error::{EngineError, ErrorCode, Result};
use crate::request::{IndexProbe, SelectRequest};

pub use aggregate::FunctionRegistry;

/// Leaf operators: where rows enter the tree.
#[derive(Debug)]
pub enum ScanOperator {
    Full {
        filter: Option<TableFilter>,
    },
    Index {
        probe: IndexProbe,
    },
    /// Probe the primary key index for each key value.
    PrimaryKey {
        index: String,
        keys: Vec<Value>,
    },
}

/// Run a leaf scan, producing the matching rows and their row ids.
pub fn run_scan(
    table: &DataTable,
    indexes: &IndexEngine,
    scan: &ScanOperator,
    snapshot: &Snapshot,
) -> Result<(DataChunk, Vec<RowId>)> {
    let types = table.copy_types();
    let column_ids: Vec<usize> = (0..types.len()).collect();
    match scan {
        ScanOperator::Full { filter } => {
            let mut state =
                table.initialize_scan(column_ids.clone(), filter.clone(), *snapshot);
            let mut output = DataChunk::new(&types);
            let mut row_ids = Vec::new();
            while table.scan_with_row_ids(&mut output, &mut row_ids, &mut state)? {}
            trace!(rows = output.cardinality(), "full scan");
            Ok((output, row_ids))
        }
        ScanOperator::Index { probe } => {
            let index = indexes.find_by_name(&probe.index).ok_or_else(|| {
                EngineError::new(
                    ErrorCode::IndexNotExists,
                    format!("index {} does not exist", probe.index),
                )
            })?;
            let mut row_ids = index.search(probe.op, &probe.value)?;
            row_ids.sort_unstable();
            let mut output = DataChunk::new(&types);
            table.fetch(&mut output, &column_ids, &row_ids, snapshot)?;
            trace!(rows = output.cardinality(), index = %probe.index, "index scan");
            Ok((output, row_ids))
        }
        ScanOperator::PrimaryKey { index, keys } => {
            let index = indexes.find_by_name(index).ok_or_else(|| {
                EngineError::new(
                    ErrorCode::IndexNotExists,
                    format!("primary key index {index} does not exist"),
                )
            })?;
            let mut row_ids = Vec::new();
            for key in keys {
                row_ids.extend(index.find(key)?);
            }
            row_ids.sort_unstable();
            row_ids.dedup();
            let mut output = DataChunk::new(&types);
            table.fetch(&mut output, &column_ids, &row_ids, snapshot)?;
            Ok((output, row_ids))
        }
    }
}

/// Match operator: keep rows satisfying the filter.
pub fn run_match(input: &DataChunk, filter: &TableFilter) -> Result<DataChunk> {
    let mut output = DataChunk::new(&input.types());
    for row in input.rows() {
        if filter.matches_row(&row) {
            output
                .push_row(row)
                .map_err(|e| EngineError::new(ErrorCode::SchemaError, e.to_string()))?;
        }
    }
    Ok(output)
}

/// Distinct operator: drop duplicate rows, preserving first occurrence.
pub fn run_distinct(input: &DataChunk) -> Result<DataChunk> {
    let mut output = DataChunk::new(&input.types());
    let mut seen: BTreeSet<Vec<IndexKey>> = BTreeSet::new();
    for row in input.rows() {
        let key: Vec<IndexKey> = row.iter().cloned().map(IndexKey::from).collect();
        if seen.insert(key) {
            output
                .push_row(row)
                .map_err(|e| EngineError::new(ErrorCode::SchemaError, e.to_string()))?;
        }
    }
    Ok(output)
}

/// Limit/offset operator.
pub fn run_limit(input: &DataChunk, limit: Option<usize>, offset: usize) -> Result<DataChunk> {
    let mut output = DataChunk::new(&input.types());
    let end = match limit {
        Some(limit) => (offset + limit).min(input.cardinality()),
        None => input.cardinality(),
    };
    for row in offset..end {
        output
            .append_row_from(input, row)
            .map_err(|e| EngineError::new(ErrorCode::SchemaError, e.to_string()))?;
    }
    Ok(output)
}

/// Project a chunk down to the requested columns (empty = all).
pub fn run_project(input: DataChunk, columns: &[usize]) -> Result<DataChunk> {
    if columns.is_empty() {
        return Ok(input);
    }
    let types = input.types();
    let projected: Vec<LogicalType> = columns.iter().map(|&c| types[c].clone()).collect();
    let mut output = DataChunk::new(&projected);
    for row in input.rows() {
        let values: Vec<Value> = columns.iter().map(|&c| row[c].clone()).collect();
        output
            .push_row(values)
            .map_err(|e| EngineError::new(ErrorCode::SchemaError, e.to_string()))?;
    }
    Ok(output)
}

/// Pick an index for a pushed-down constant filter, when one exists.
fn select_leaf(table: &DataTable, indexes: &IndexEngine, filter: &Option<TableFilter>) -> ScanOperator {
    if let Some(TableFilter::Constant { column, op, value }) = filter {
        let defs = table.columns();
        if let Some(def) = defs.get(*column) {
            if let Some(index) = indexes.find_by_key_prefix(&[def.name.clone()]) {
                return ScanOperator::Index {
                    probe: IndexProbe {
                        index: index.name().to_string(),
                        op: *op,
                        value: value.clone(),
                    },
                };
            }
        }
    }
    ScanOperator::Full {
        filter: filter.clone(),
    }
}

/// The aggregate coordinator: one leaf scan feeding
/// match -> group -> sort -> having -> distinct -> limit.
pub fn run_select(
    table: &DataTable,
    indexes: &IndexEngine,
    registry: &FunctionRegistry,
    request: &SelectRequest,
    snapshot: &Snapshot,
) -> Result<DataChunk> {
    let leaf = select_leaf(table, indexes, &request.filter);
    let (mut chunk, _row_ids) = run_scan(table, indexes, &leaf, snapshot)?;

    // residual match: index scans already applied the probe, full scans the
    // pushed-down filter; anything else still needs the match pass
    if let (Some(filter), ScanOperator::Index { .. }) = (&request.filter, &leaf) {
        if !matches!(filter, TableFilter::Constant { .. }) {
            chunk = run_match(&chunk, filter)?;
        }
    }

    if let Some(group) = &request.group {
        chunk = aggregate::run_group(&chunk, group, registry)?;
    }

    if !request.order.is_empty() {
        chunk = sort::run_sort(&chunk, &request.order)?;
    }

    if let Some(having) = &request.having {
        chunk = run_match(&chunk, having)?;
    }

    if request.distinct {
        chunk = run_distinct(&chunk)?;
    }

    if request.limit.is_some() || request.offset > 0 {
        chunk = run_limit(&chunk, request.limit, request.offset)?;
    }

    if request.group.is_none() {
        chunk = run_project(chunk, &request.columns)?;
    }
    Ok(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxbow_types::CompareOp;

    fn chunk_of(values: &[i64]) -> DataChunk {
        let mut chunk = DataChunk::new(&[LogicalType::Int64]);
        for &v in values {
            chunk.push_row(vec![Value::Int64(v)]).unwrap();
        }
        chunk
    }

    #[test]
    fn match_filters_rows() {
        let chunk = chunk_of(&[1, 2, 3, 4, 5]);
        let filter = TableFilter::Constant {
            column: 0,
            op: CompareOp::Gt,
            value: Value::Int64(3),
        };
        let out = run_match(&chunk, &filter).unwrap();
        assert_eq!(out.cardinality(), 2);
    }

    #[test]
    fn distinct_dedupes() {
        let chunk = chunk_of(&[1, 2, 2, 3, 1]);
        let out = run_distinct(&chunk).unwrap();
        assert_eq!(out.cardinality(), 3);
    }

    #[test]
    fn limit_and_offset() {
        let chunk = chunk_of(&[1, 2, 3, 4, 5]);
        let out = run_limit(&chunk, Some(2), 1).unwrap();
        assert_eq!(out.cardinality(), 2);
        assert_eq!(out.value(0, 0), Value::Int64(2));
        assert_eq!(out.value(0, 1), Value::Int64(3));
    }

    #[test]
    fn project_reorders_columns() {
        let mut chunk = DataChunk::new(&[LogicalType::Int64, LogicalType::String]);
        chunk
            .push_row(vec![Value::Int64(1), Value::String("a".into())])
            .unwrap();
        let out = run_project(chunk, &[1]).unwrap();
        assert_eq!(out.column_count(), 1);
        assert_eq!(out.value(0, 0), Value::String("a".into()));
    }
}
