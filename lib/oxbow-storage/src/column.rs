//! Column data: the per-column engine of a row group.
//!
//! A column owns an append-only list of segments plus cumulative statistics.
//! The kind discriminates primitive columns from the validity bitset column
//! and the nested list/array/struct engines; shared behavior (segment
//! bookkeeping, statistics, zonemap checks) lives on the common struct.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use oxbow_types::{
    FilterPropagation, LogicalType, TableFilter, Validity, Value, Vector, VectorBuffer,
};

use crate::block::BlockManager;
use crate::buffer::BufferPool;
use crate::checkpoint::{flush_segment, PartialBlockManager};
use crate::error::{Result, StorageError};
use crate::segment::{ColumnSegment, DataPointer};
use crate::statistics::BaseStatistics;

/// Default byte size of one in-memory segment: one block.
pub const DEFAULT_SEGMENT_SIZE: usize = crate::block::DEFAULT_BLOCK_SIZE;

#[derive(Debug)]
enum ColumnKind {
    Primitive {
        validity: Box<ColumnData>,
    },
    /// Bitset column tracking NULLs of its parent, stored as one `u8` per
    /// row.
    Validity,
    List {
        validity: Box<ColumnData>,
        child: Box<ColumnData>,
    },
    Array {
        validity: Box<ColumnData>,
        child: Box<ColumnData>,
        arity: usize,
    },
    Struct {
        validity: Box<ColumnData>,
        children: Vec<ColumnData>,
    },
}

/// Serialized form of one column after a checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentColumnData {
    pub data_pointers: Vec<DataPointer>,
    pub stats: BaseStatistics,
    pub row_count: u64,
    pub validity: Option<Box<PersistentColumnData>>,
    pub children: Vec<PersistentColumnData>,
}

#[derive(Debug)]
pub struct ColumnData {
    ty: LogicalType,
    /// Type of this column's own segments (offsets for lists, bitset bytes
    /// for validity).
    segment_type: LogicalType,
    segment_size: usize,
    rows: AtomicU64,
    segments: RwLock<Vec<Arc<ColumnSegment>>>,
    stats: Mutex<BaseStatistics>,
    kind: ColumnKind,
    pool: Arc<BufferPool>,
}

impl ColumnData {
    pub fn new(pool: Arc<BufferPool>, ty: LogicalType) -> Self {
        Self::with_segment_size(pool, ty, DEFAULT_SEGMENT_SIZE)
    }

    pub fn with_segment_size(pool: Arc<BufferPool>, ty: LogicalType, segment_size: usize) -> Self {
        let kind = match &ty {
            LogicalType::List(elem) => ColumnKind::List {
                validity: Box::new(Self::new_validity(Arc::clone(&pool), segment_size)),
                child: Box::new(Self::with_segment_size(
                    Arc::clone(&pool),
                    elem.as_ref().clone(),
                    segment_size,
                )),
            },
            LogicalType::Array { element, arity } => ColumnKind::Array {
                validity: Box::new(Self::new_validity(Arc::clone(&pool), segment_size)),
                child: Box::new(Self::with_segment_size(
                    Arc::clone(&pool),
                    element.as_ref().clone(),
                    segment_size,
                )),
                arity: *arity,
            },
            LogicalType::Struct(fields) => ColumnKind::Struct {
                validity: Box::new(Self::new_validity(Arc::clone(&pool), segment_size)),
                children: fields
                    .iter()
                    .map(|f| {
                        Self::with_segment_size(Arc::clone(&pool), f.ty.clone(), segment_size)
                    })
                    .collect(),
            },
            _ => ColumnKind::Primitive {
                validity: Box::new(Self::new_validity(Arc::clone(&pool), segment_size)),
            },
        };
        let segment_type = match &kind {
            ColumnKind::List { .. } => LogicalType::UInt64,
            ColumnKind::Validity => LogicalType::UInt8,
            _ => ty.clone(),
        };
        ColumnData {
            stats: Mutex::new(BaseStatistics::new(ty.clone())),
            segment_type,
            segment_size,
            rows: AtomicU64::new(0),
            segments: RwLock::new(Vec::new()),
            kind,
            pool,
            ty,
        }
    }

    fn new_validity(pool: Arc<BufferPool>, segment_size: usize) -> Self {
        ColumnData {
            ty: LogicalType::UInt8,
            segment_type: LogicalType::UInt8,
            segment_size,
            rows: AtomicU64::new(0),
            segments: RwLock::new(Vec::new()),
            stats: Mutex::new(BaseStatistics::new(LogicalType::UInt8)),
            kind: ColumnKind::Validity,
            pool,
        }
    }

    pub fn logical_type(&self) -> &LogicalType {
        &self.ty
    }

    pub fn total_rows(&self) -> u64 {
        self.rows.load(Ordering::Acquire)
    }

    pub fn statistics(&self) -> BaseStatistics {
        self.stats.lock().clone()
    }

    pub fn set_statistics(&self, stats: BaseStatistics) {
        *self.stats.lock() = stats;
    }

    pub fn segments(&self) -> Vec<Arc<ColumnSegment>> {
        self.segments.read().clone()
    }

    /// Append rows `[0, count)` of `vector`.
    pub fn append(&self, vector: &Vector, count: usize) -> Result<()> {
        match &self.kind {
            ColumnKind::Primitive { validity } => {
                self.stats.lock().update(vector, count);
                self.append_to_segments(vector, count)?;
                validity.append_validity(vector.validity(), count)?;
            }
            ColumnKind::Validity => {
                return Err(StorageError::Unsupported {
                    operation: "direct append to a validity column",
                })
            }
            ColumnKind::List { validity, child } => {
                let VectorBuffer::List { offsets, child: child_vector } = vector.buffer() else {
                    return Err(StorageError::SchemaMismatch {
                        detail: "list column fed a non-list vector".into(),
                    });
                };
                let child_base = child.total_rows();
                let mut rebased = Vector::new(LogicalType::UInt64);
                for &offset in offsets.iter().take(count) {
                    rebased
                        .push(Value::UInt64(child_base + offset))
                        .map_err(schema_error)?;
                }
                self.append_to_segments(&rebased, count)?;
                let child_count = offsets.get(count.wrapping_sub(1)).copied().unwrap_or(0);
                child.append(child_vector, child_count as usize)?;
                validity.append_validity(vector.validity(), count)?;
                self.stats.lock().update(vector, count);
            }
            ColumnKind::Array { validity, child, arity } => {
                let VectorBuffer::Array { child: child_vector, .. } = vector.buffer() else {
                    return Err(StorageError::SchemaMismatch {
                        detail: "array column fed a non-array vector".into(),
                    });
                };
                child.append(child_vector, count * arity)?;
                validity.append_validity(vector.validity(), count)?;
                self.stats.lock().update(vector, count);
            }
            ColumnKind::Struct { validity, children } => {
                let VectorBuffer::Struct(field_vectors) = vector.buffer() else {
                    return Err(StorageError::SchemaMismatch {
                        detail: "struct column fed a non-struct vector".into(),
                    });
                };
                for (child, field_vector) in children.iter().zip(field_vectors) {
                    child.append(field_vector, count)?;
                }
                validity.append_validity(vector.validity(), count)?;
                self.stats.lock().update(vector, count);
            }
        }
        self.rows.fetch_add(count as u64, Ordering::AcqRel);
        Ok(())
    }

    /// Append `count` bits of a validity bitmap into a validity column.
    fn append_validity(&self, validity: &Validity, count: usize) -> Result<()> {
        debug_assert!(matches!(self.kind, ColumnKind::Validity));
        let mut bits = Vector::new(LogicalType::UInt8);
        for row in 0..count {
            let valid = row >= validity.len() || validity.row_is_valid(row);
            bits.push(Value::UInt8(valid as u8)).map_err(schema_error)?;
        }
        self.append_to_segments(&bits, count)?;
        self.rows.fetch_add(count as u64, Ordering::AcqRel);
        Ok(())
    }

    fn append_to_segments(&self, vector: &Vector, count: usize) -> Result<()> {
        let mut appended = 0;
        while appended < count {
            let segment = self.writable_tail()?;
            let n = segment.append(vector, appended, count - appended)?;
            if n == 0 {
                self.push_segment()?;
                continue;
            }
            appended += n;
        }
        Ok(())
    }

    fn writable_tail(&self) -> Result<Arc<ColumnSegment>> {
        {
            let segments = self.segments.read();
            if let Some(tail) = segments.last() {
                if !tail.is_persistent() && tail.count() < tail.capacity() {
                    return Ok(Arc::clone(tail));
                }
            }
        }
        self.push_segment()
    }

    fn push_segment(&self) -> Result<Arc<ColumnSegment>> {
        let mut segments = self.segments.write();
        let row_start = segments.iter().map(|s| s.count()).sum();
        let segment = Arc::new(ColumnSegment::new_in_memory(
            &self.pool,
            self.segment_type.clone(),
            row_start,
            self.segment_size,
        ));
        segments.push(Arc::clone(&segment));
        Ok(segment)
    }

    /// Copy rows `[offset, offset + count)` into `result`.
    pub fn scan(&self, result: &mut Vector, offset: u64, count: u64) -> Result<()> {
        let base = result.len();
        match &self.kind {
            ColumnKind::Primitive { .. } | ColumnKind::Validity => {
                self.scan_segments(result, offset, count)?;
            }
            ColumnKind::List { child, .. } => {
                for row in offset..offset + count {
                    let end = self.offset_at(row)?;
                    let start = if row == 0 { 0 } else { self.offset_at(row - 1)? };
                    let mut elems = Vector::new(child.logical_type().clone());
                    child.scan(&mut elems, start, end - start)?;
                    let values = (0..elems.len()).map(|i| elems.value(i)).collect();
                    result.push(Value::List(values)).map_err(schema_error)?;
                }
            }
            ColumnKind::Array { child, arity, .. } => {
                for row in offset..offset + count {
                    let mut elems = Vector::new(child.logical_type().clone());
                    child.scan(&mut elems, row * *arity as u64, *arity as u64)?;
                    let values = (0..elems.len()).map(|i| elems.value(i)).collect();
                    result.push(Value::List(values)).map_err(schema_error)?;
                }
            }
            ColumnKind::Struct { children, .. } => {
                let mut fields: Vec<Vector> = Vec::with_capacity(children.len());
                for child in children {
                    let mut v = Vector::new(child.logical_type().clone());
                    child.scan(&mut v, offset, count)?;
                    fields.push(v);
                }
                for row in 0..count as usize {
                    let values = fields.iter().map(|f| f.value(row)).collect();
                    result.push(Value::Struct(values)).map_err(schema_error)?;
                }
            }
        }
        // overlay NULLs from the validity column
        if let Some(validity) = self.validity_column() {
            let bits = validity.validity_bits(offset, count)?;
            for (i, valid) in bits.iter().enumerate() {
                if !valid {
                    result.validity_mut().set_invalid(base + i);
                }
            }
        }
        Ok(())
    }

    fn scan_segments(&self, result: &mut Vector, offset: u64, count: u64) -> Result<()> {
        let segments = self.segments.read();
        let mut remaining = count;
        let mut position = offset;
        for segment in segments.iter() {
            if remaining == 0 {
                break;
            }
            let seg_start = segment.row_start();
            let seg_end = seg_start + segment.count();
            if position >= seg_end {
                continue;
            }
            let in_segment = position - seg_start;
            let take = remaining.min(segment.count() - in_segment);
            segment.scan(result, in_segment, take)?;
            position += take;
            remaining -= take;
        }
        if remaining > 0 {
            return Err(StorageError::InvalidArgument {
                detail: format!("scan ran past the end of the column ({remaining} rows short)"),
            });
        }
        Ok(())
    }

    /// Random access by row offset within this column.
    pub fn fetch_row(&self, row: u64) -> Result<Value> {
        if let Some(validity) = self.validity_column() {
            if !validity.validity_bit(row)? {
                return Ok(Value::Null);
            }
        }
        match &self.kind {
            ColumnKind::Primitive { .. } | ColumnKind::Validity => {
                let segment = self.segment_for_row(row)?;
                segment.fetch_row(row - segment.row_start())
            }
            ColumnKind::List { child, .. } => {
                let end = self.offset_at(row)?;
                let start = if row == 0 { 0 } else { self.offset_at(row - 1)? };
                let mut elems = Vector::new(child.logical_type().clone());
                child.scan(&mut elems, start, end - start)?;
                Ok(Value::List((0..elems.len()).map(|i| elems.value(i)).collect()))
            }
            ColumnKind::Array { child, arity, .. } => {
                let mut elems = Vector::new(child.logical_type().clone());
                child.scan(&mut elems, row * *arity as u64, *arity as u64)?;
                Ok(Value::List((0..elems.len()).map(|i| elems.value(i)).collect()))
            }
            ColumnKind::Struct { children, .. } => {
                let mut values = Vec::with_capacity(children.len());
                for child in children {
                    values.push(child.fetch_row(row)?);
                }
                Ok(Value::Struct(values))
            }
        }
    }

    /// In-place overwrite; fixed-width primitive columns only.
    pub fn update_row(&self, row: u64, value: &Value) -> Result<()> {
        match &self.kind {
            ColumnKind::Primitive { validity } => {
                if !self.ty.physical_type().is_fixed_width() {
                    return Err(StorageError::Unsupported {
                        operation: "in-place update of a variable-width column",
                    });
                }
                let segment = self.segment_for_row(row)?;
                segment.update_row(row - segment.row_start(), value)?;
                let bit_segment = validity.segment_for_row(row)?;
                bit_segment.update_row(
                    row - bit_segment.row_start(),
                    &Value::UInt8(!value.is_null() as u8),
                )?;
                if !value.is_null() {
                    self.stats.lock().update_value(value);
                }
                Ok(())
            }
            _ => Err(StorageError::Unsupported {
                operation: "in-place update of a nested or validity column",
            }),
        }
    }

    /// Whole-column zonemap check.
    pub fn check_zonemap(&self, filter: &TableFilter, column: usize) -> FilterPropagation {
        self.stats.lock().check_filter(filter, column)
    }

    /// Zonemap check for the segment containing `row`.
    pub fn check_segment_zonemap(
        &self,
        row: u64,
        filter: &TableFilter,
        column: usize,
    ) -> FilterPropagation {
        match self.segment_for_row(row) {
            Ok(segment) => segment.segment_statistics().check_filter(filter, column),
            Err(_) => FilterPropagation::NoPruningPossible,
        }
    }

    fn segment_for_row(&self, row: u64) -> Result<Arc<ColumnSegment>> {
        let segments = self.segments.read();
        for segment in segments.iter() {
            if row >= segment.row_start() && row < segment.row_start() + segment.count() {
                return Ok(Arc::clone(segment));
            }
        }
        Err(StorageError::InvalidArgument {
            detail: format!("row {row} beyond column of {} rows", self.total_rows()),
        })
    }

    fn validity_column(&self) -> Option<&ColumnData> {
        match &self.kind {
            ColumnKind::Primitive { validity }
            | ColumnKind::List { validity, .. }
            | ColumnKind::Array { validity, .. }
            | ColumnKind::Struct { validity, .. } => Some(validity),
            ColumnKind::Validity => None,
        }
    }

    fn validity_bit(&self, row: u64) -> Result<bool> {
        debug_assert!(matches!(self.kind, ColumnKind::Validity));
        let segment = self.segment_for_row(row)?;
        Ok(segment.fetch_row(row - segment.row_start())? != Value::UInt8(0))
    }

    fn validity_bits(&self, offset: u64, count: u64) -> Result<Vec<bool>> {
        debug_assert!(matches!(self.kind, ColumnKind::Validity));
        let mut bits = Vector::new(LogicalType::UInt8);
        self.scan_segments(&mut bits, offset, count)?;
        Ok((0..count as usize)
            .map(|i| bits.value(i) != Value::UInt8(0))
            .collect())
    }

    /// Cumulative list offset stored at `row`.
    fn offset_at(&self, row: u64) -> Result<u64> {
        let segment = self.segment_for_row(row)?;
        match segment.fetch_row(row - segment.row_start())? {
            Value::UInt64(offset) => Ok(offset),
            other => Err(StorageError::corrupted(
                "list offsets",
                format!("unexpected offset value {other}"),
            )),
        }
    }

    /// Flush every in-memory segment and produce the serialized descriptor.
    pub fn checkpoint(&self, partial: &mut PartialBlockManager) -> Result<PersistentColumnData> {
        let mut data_pointers = Vec::new();
        for segment in self.segments.read().iter() {
            data_pointers.push(flush_segment(segment, partial)?);
        }
        let validity = match self.validity_column() {
            Some(validity) => Some(Box::new(validity.checkpoint(partial)?)),
            None => None,
        };
        let children = match &self.kind {
            ColumnKind::List { child, .. } | ColumnKind::Array { child, .. } => {
                vec![child.checkpoint(partial)?]
            }
            ColumnKind::Struct { children, .. } => children
                .iter()
                .map(|c| c.checkpoint(partial))
                .collect::<Result<_>>()?,
            _ => Vec::new(),
        };
        Ok(PersistentColumnData {
            data_pointers,
            stats: self.statistics(),
            row_count: self.total_rows(),
            validity,
            children,
        })
    }

    /// Rebuild a column from its serialized descriptor; segments decompress
    /// lazily on scan.
    pub fn load(
        pool: Arc<BufferPool>,
        manager: &Arc<BlockManager>,
        ty: LogicalType,
        segment_size: usize,
        persistent: &PersistentColumnData,
    ) -> Result<Self> {
        let mut column = Self::with_segment_size(Arc::clone(&pool), ty, segment_size);
        column.restore(&pool, manager, persistent)?;
        Ok(column)
    }

    fn restore(
        &mut self,
        pool: &Arc<BufferPool>,
        manager: &Arc<BlockManager>,
        persistent: &PersistentColumnData,
    ) -> Result<()> {
        {
            let mut segments = self.segments.write();
            for pointer in &persistent.data_pointers {
                segments.push(Arc::new(ColumnSegment::persistent(
                    pool,
                    Arc::clone(manager),
                    self.segment_type.clone(),
                    pointer.clone(),
                )));
            }
        }
        self.rows.store(persistent.row_count, Ordering::Release);
        *self.stats.lock() = persistent.stats.clone();
        if let (Some(validity), Some(persisted)) = (
            self.validity_column_mut(),
            persistent.validity.as_deref(),
        ) {
            validity.restore(pool, manager, persisted)?;
        }
        match &mut self.kind {
            ColumnKind::List { child, .. } | ColumnKind::Array { child, .. } => {
                if let Some(persisted) = persistent.children.first() {
                    child.restore(pool, manager, persisted)?;
                }
            }
            ColumnKind::Struct { children, .. } => {
                for (child, persisted) in children.iter_mut().zip(&persistent.children) {
                    child.restore(pool, manager, persisted)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn validity_column_mut(&mut self) -> Option<&mut ColumnData> {
        match &mut self.kind {
            ColumnKind::Primitive { validity }
            | ColumnKind::List { validity, .. }
            | ColumnKind::Array { validity, .. }
            | ColumnKind::Struct { validity, .. } => Some(validity),
            ColumnKind::Validity => None,
        }
    }
}

fn schema_error(e: oxbow_types::VectorError) -> StorageError {
    StorageError::SchemaMismatch {
        detail: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxbow_types::CompareOp;

    fn pool() -> Arc<BufferPool> {
        BufferPool::new(1 << 30)
    }

    fn int64_vector(values: &[Option<i64>]) -> Vector {
        let mut v = Vector::new(LogicalType::Int64);
        for value in values {
            match value {
                Some(x) => v.push(Value::Int64(*x)).unwrap(),
                None => v.push(Value::Null).unwrap(),
            }
        }
        v
    }

    #[test]
    fn append_and_scan_with_nulls() {
        let column = ColumnData::new(pool(), LogicalType::Int64);
        let values: Vec<Option<i64>> = (0..100)
            .map(|i| if i % 10 == 0 { None } else { Some(i) })
            .collect();
        column.append(&int64_vector(&values), 100).unwrap();
        assert_eq!(column.total_rows(), 100);

        let mut out = Vector::new(LogicalType::Int64);
        column.scan(&mut out, 0, 100).unwrap();
        for (i, expected) in values.iter().enumerate() {
            match expected {
                Some(x) => assert_eq!(out.value(i), Value::Int64(*x)),
                None => assert_eq!(out.value(i), Value::Null),
            }
        }
    }

    #[test]
    fn multiple_segments() {
        // 64-byte segments hold 8 i64 values each
        let column = ColumnData::with_segment_size(pool(), LogicalType::Int64, 64);
        let values: Vec<Option<i64>> = (0..100).map(Some).collect();
        column.append(&int64_vector(&values), 100).unwrap();
        assert!(column.segments().len() > 1);

        // segment boundaries are contiguous
        let segments = column.segments();
        for pair in segments.windows(2) {
            assert_eq!(pair[0].row_start() + pair[0].count(), pair[1].row_start());
        }

        let mut out = Vector::new(LogicalType::Int64);
        column.scan(&mut out, 60, 20).unwrap();
        assert_eq!(out.value(0), Value::Int64(60));
        assert_eq!(out.value(19), Value::Int64(79));
    }

    #[test]
    fn fetch_and_update() {
        let column = ColumnData::new(pool(), LogicalType::Int64);
        let values: Vec<Option<i64>> = (0..10).map(Some).collect();
        column.append(&int64_vector(&values), 10).unwrap();
        column.update_row(3, &Value::Int64(333)).unwrap();
        assert_eq!(column.fetch_row(3).unwrap(), Value::Int64(333));
        column.update_row(4, &Value::Null).unwrap();
        assert_eq!(column.fetch_row(4).unwrap(), Value::Null);
    }

    #[test]
    fn column_statistics_cover_segment_statistics() {
        let column = ColumnData::with_segment_size(pool(), LogicalType::Int64, 64);
        let values: Vec<Option<i64>> = (1..=100).map(Some).collect();
        column.append(&int64_vector(&values), 100).unwrap();

        let stats = column.statistics();
        assert_eq!(stats.min_value(), Some(&Value::Int64(1)));
        assert_eq!(stats.max_value(), Some(&Value::Int64(100)));

        for segment in column.segments() {
            let seg_stats = segment.segment_statistics();
            if !seg_stats.has_stats() {
                continue;
            }
            assert!(
                stats
                    .min_value()
                    .unwrap()
                    .compare(seg_stats.min_value().unwrap())
                    != Some(std::cmp::Ordering::Greater)
            );
            assert!(
                stats
                    .max_value()
                    .unwrap()
                    .compare(seg_stats.max_value().unwrap())
                    != Some(std::cmp::Ordering::Less)
            );
        }
    }

    #[test]
    fn zonemap_checks() {
        let column = ColumnData::new(pool(), LogicalType::Int64);
        let values: Vec<Option<i64>> = (1..=100).map(Some).collect();
        column.append(&int64_vector(&values), 100).unwrap();

        let gt_200 = TableFilter::Constant {
            column: 0,
            op: CompareOp::Gt,
            value: Value::Int64(200),
        };
        assert_eq!(
            column.check_zonemap(&gt_200, 0),
            FilterPropagation::AlwaysFalse
        );
        let gte_0 = TableFilter::Constant {
            column: 0,
            op: CompareOp::Gte,
            value: Value::Int64(0),
        };
        assert_eq!(
            column.check_zonemap(&gte_0, 0),
            FilterPropagation::AlwaysTrue
        );
        assert_eq!(
            column.check_segment_zonemap(5, &gt_200, 0),
            FilterPropagation::AlwaysFalse
        );
    }

    #[test]
    fn list_column_round_trip() {
        let column = ColumnData::new(pool(), LogicalType::List(Box::new(LogicalType::Int32)));
        let mut v = Vector::new(LogicalType::List(Box::new(LogicalType::Int32)));
        v.push(Value::List(vec![Value::Int32(1), Value::Int32(2)]))
            .unwrap();
        v.push(Value::List(vec![])).unwrap();
        v.push(Value::List(vec![Value::Int32(3)])).unwrap();
        column.append(&v, 3).unwrap();

        assert_eq!(
            column.fetch_row(0).unwrap(),
            Value::List(vec![Value::Int32(1), Value::Int32(2)])
        );
        assert_eq!(column.fetch_row(1).unwrap(), Value::List(vec![]));
        assert_eq!(column.fetch_row(2).unwrap(), Value::List(vec![Value::Int32(3)]));

        // second batch continues the cumulative offsets
        let mut v2 = Vector::new(LogicalType::List(Box::new(LogicalType::Int32)));
        v2.push(Value::List(vec![Value::Int32(4), Value::Int32(5)]))
            .unwrap();
        column.append(&v2, 1).unwrap();
        assert_eq!(
            column.fetch_row(3).unwrap(),
            Value::List(vec![Value::Int32(4), Value::Int32(5)])
        );
    }

    #[test]
    fn struct_column_round_trip() {
        let ty = LogicalType::Struct(vec![
            oxbow_types::StructField {
                name: "a".into(),
                ty: LogicalType::Int64,
            },
            oxbow_types::StructField {
                name: "b".into(),
                ty: LogicalType::String,
            },
        ]);
        let column = ColumnData::new(pool(), ty.clone());
        let mut v = Vector::new(ty);
        v.push(Value::Struct(vec![
            Value::Int64(1),
            Value::String("x".into()),
        ]))
        .unwrap();
        v.push(Value::Null).unwrap();
        column.append(&v, 2).unwrap();

        assert_eq!(
            column.fetch_row(0).unwrap(),
            Value::Struct(vec![Value::Int64(1), Value::String("x".into())])
        );
        assert_eq!(column.fetch_row(1).unwrap(), Value::Null);
    }

    #[test]
    fn array_column_round_trip() {
        let ty = LogicalType::Array {
            element: Box::new(LogicalType::Int32),
            arity: 3,
        };
        let column = ColumnData::new(pool(), ty.clone());
        let mut v = Vector::new(ty);
        v.push(Value::List(vec![
            Value::Int32(1),
            Value::Int32(2),
            Value::Int32(3),
        ]))
        .unwrap();
        column.append(&v, 1).unwrap();
        assert_eq!(
            column.fetch_row(0).unwrap(),
            Value::List(vec![Value::Int32(1), Value::Int32(2), Value::Int32(3)])
        );
    }
}
