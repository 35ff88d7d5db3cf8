//! Column segments: block-backed chunks of a single column's values.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use oxbow_types::{LogicalType, PhysicalType, Value, Vector};

use crate::block::{BlockManager, BlockPointer};
use crate::buffer::{BlockHandle, BufferPool};
use crate::error::{Result, StorageError};
use crate::statistics::BaseStatistics;

/// How a persisted segment is encoded on its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionType {
    Uncompressed,
    /// Every value is identical; one copy of the value is stored.
    Constant,
    /// `[num_runs u32][value bytes + run_length u32]*`
    Rle,
    /// `[num_unique u16][values][1- or 2-byte indices]`
    Dictionary,
}

/// Descriptor of one persisted segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPointer {
    pub row_start: u64,
    pub tuple_count: u64,
    pub block_pointer: BlockPointer,
    pub compression: CompressionType,
    pub segment_size: u64,
    pub stats: BaseStatistics,
}

#[derive(Debug)]
enum SegmentData {
    /// Writable in-memory segment of fixed-width values, raw little-endian
    /// bytes in a buffer-pool frame.
    Fixed(BlockHandle),
    Strings(RwLock<Vec<String>>),
    Blobs(RwLock<Vec<Vec<u8>>>),
    /// Read-only segment persisted by a checkpoint; decompressed on scan.
    Persistent {
        handle: BlockHandle,
        pointer: DataPointer,
    },
}

/// One chunk of one column's values.
///
/// `row_start` is relative to the owning column data. A segment is append
/// only; in-place overwrites are allowed for fixed-width types only.
#[derive(Debug)]
pub struct ColumnSegment {
    ty: LogicalType,
    physical: PhysicalType,
    type_size: usize,
    row_start: u64,
    count: AtomicU64,
    capacity: u64,
    data: SegmentData,
    stats: Mutex<BaseStatistics>,
}

impl ColumnSegment {
    /// Create a writable in-memory segment backed by a transient pool frame.
    pub fn new_in_memory(
        pool: &Arc<BufferPool>,
        ty: LogicalType,
        row_start: u64,
        segment_size: usize,
    ) -> Self {
        let physical = ty.physical_type();
        let (type_size, capacity, data) = match physical.fixed_size() {
            Some(size) => (
                size,
                (segment_size / size) as u64,
                SegmentData::Fixed(pool.allocate(segment_size)),
            ),
            None => {
                let data = if physical == PhysicalType::Varchar {
                    SegmentData::Strings(RwLock::new(Vec::new()))
                } else {
                    SegmentData::Blobs(RwLock::new(Vec::new()))
                };
                (0, (segment_size / 8) as u64, data)
            }
        };
        ColumnSegment {
            stats: Mutex::new(BaseStatistics::new(ty.clone())),
            ty,
            physical,
            type_size,
            row_start,
            count: AtomicU64::new(0),
            capacity,
            data,
        }
    }

    /// Wrap a persisted data pointer; bytes are pinned and decompressed on
    /// demand.
    pub fn persistent(
        pool: &Arc<BufferPool>,
        manager: Arc<BlockManager>,
        ty: LogicalType,
        pointer: DataPointer,
    ) -> Self {
        let physical = ty.physical_type();
        let handle = pool.register_block(manager, pointer.block_pointer.block_id);
        ColumnSegment {
            stats: Mutex::new(pointer.stats.clone()),
            physical,
            type_size: physical.fixed_size().unwrap_or(0),
            row_start: pointer.row_start,
            count: AtomicU64::new(pointer.tuple_count),
            capacity: pointer.tuple_count,
            data: SegmentData::Persistent { handle, pointer },
            ty,
        }
    }

    pub fn logical_type(&self) -> &LogicalType {
        &self.ty
    }

    pub fn physical_type(&self) -> PhysicalType {
        self.physical
    }

    pub fn type_size(&self) -> usize {
        self.type_size
    }

    pub fn row_start(&self) -> u64 {
        self.row_start
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self.data, SegmentData::Persistent { .. })
    }

    /// The descriptor this segment was loaded from, if it is persisted.
    pub fn data_pointer(&self) -> Option<DataPointer> {
        match &self.data {
            SegmentData::Persistent { pointer, .. } => Some(pointer.clone()),
            _ => None,
        }
    }

    /// Per-segment zonemap.
    pub fn segment_statistics(&self) -> BaseStatistics {
        self.stats.lock().clone()
    }

    pub fn set_segment_statistics(&self, stats: BaseStatistics) {
        *self.stats.lock() = stats;
    }

    /// Append up to `count` rows of `vector` starting at `vector_offset`.
    /// Returns how many rows were actually appended (less than `count` when
    /// the segment fills up).
    pub fn append(&self, vector: &Vector, vector_offset: usize, count: usize) -> Result<usize> {
        let current = self.count();
        let room = (self.capacity - current) as usize;
        let appended = room.min(count);
        if appended == 0 {
            return Ok(0);
        }
        match &self.data {
            SegmentData::Fixed(handle) => {
                let pin = handle.pin()?;
                let mut bytes = pin.write();
                for i in 0..appended {
                    let row = vector_offset + i;
                    let value = if vector.row_is_valid(row) {
                        vector.value(row)
                    } else {
                        Value::Null
                    };
                    let at = (current as usize + i) * self.type_size;
                    encode_fixed(&value, self.physical, &mut bytes[at..at + self.type_size]);
                }
            }
            SegmentData::Strings(strings) => {
                let mut strings = strings.write();
                for i in 0..appended {
                    let value = vector.value(vector_offset + i);
                    strings.push(match value {
                        Value::String(s) => s,
                        _ => String::new(),
                    });
                }
            }
            SegmentData::Blobs(blobs) => {
                let mut blobs = blobs.write();
                for i in 0..appended {
                    let value = vector.value(vector_offset + i);
                    blobs.push(match value {
                        Value::Blob(b) => b,
                        _ => Vec::new(),
                    });
                }
            }
            SegmentData::Persistent { .. } => {
                return Err(StorageError::Unsupported {
                    operation: "append to a persisted segment",
                });
            }
        }
        {
            let mut stats = self.stats.lock();
            for i in 0..appended {
                let row = vector_offset + i;
                if vector.row_is_valid(row) {
                    stats.update_value(&vector.value(row));
                } else {
                    stats.update_value(&Value::Null);
                }
            }
        }
        self.count.fetch_add(appended as u64, Ordering::AcqRel);
        Ok(appended)
    }

    /// Copy rows `[offset, offset + count)` of this segment into `result`.
    pub fn scan(&self, result: &mut Vector, offset: u64, count: u64) -> Result<()> {
        let available = self.count();
        if offset + count > available {
            return Err(StorageError::InvalidArgument {
                detail: format!(
                    "scan of rows {offset}..{} exceeds segment count {available}",
                    offset + count
                ),
            });
        }
        match &self.data {
            SegmentData::Fixed(handle) => {
                let pin = handle.pin()?;
                let bytes = pin.read();
                for row in offset..offset + count {
                    let at = row as usize * self.type_size;
                    let value = decode_fixed(&self.ty, &bytes[at..at + self.type_size]);
                    result.push(value).map_err(schema_error)?;
                }
            }
            SegmentData::Strings(strings) => {
                let strings = strings.read();
                for row in offset..offset + count {
                    result
                        .push(Value::String(strings[row as usize].clone()))
                        .map_err(schema_error)?;
                }
            }
            SegmentData::Blobs(blobs) => {
                let blobs = blobs.read();
                for row in offset..offset + count {
                    result
                        .push(Value::Blob(blobs[row as usize].clone()))
                        .map_err(schema_error)?;
                }
            }
            SegmentData::Persistent { .. } => {
                let values = self.decompress()?;
                for row in offset..offset + count {
                    result
                        .push(values[row as usize].clone())
                        .map_err(schema_error)?;
                }
            }
        }
        Ok(())
    }

    /// Random access by row offset within the segment.
    pub fn fetch_row(&self, row: u64) -> Result<Value> {
        if row >= self.count() {
            return Err(StorageError::InvalidArgument {
                detail: format!("row {row} beyond segment count {}", self.count()),
            });
        }
        match &self.data {
            SegmentData::Fixed(handle) => {
                let pin = handle.pin()?;
                let bytes = pin.read();
                let at = row as usize * self.type_size;
                Ok(decode_fixed(&self.ty, &bytes[at..at + self.type_size]))
            }
            SegmentData::Strings(strings) => {
                Ok(Value::String(strings.read()[row as usize].clone()))
            }
            SegmentData::Blobs(blobs) => Ok(Value::Blob(blobs.read()[row as usize].clone())),
            SegmentData::Persistent { .. } => {
                let values = self.decompress()?;
                Ok(values[row as usize].clone())
            }
        }
    }

    /// Overwrite one row in place. Supported for fixed-width types only;
    /// variable-width columns are rewritten via append plus tombstone at the
    /// row-group level.
    pub fn update_row(&self, row: u64, value: &Value) -> Result<()> {
        if row >= self.count() {
            return Err(StorageError::InvalidArgument {
                detail: format!("row {row} beyond segment count {}", self.count()),
            });
        }
        match &self.data {
            SegmentData::Fixed(handle) => {
                let pin = handle.pin()?;
                let mut bytes = pin.write();
                let at = row as usize * self.type_size;
                encode_fixed(value, self.physical, &mut bytes[at..at + self.type_size]);
                self.stats.lock().update_value(value);
                Ok(())
            }
            _ => Err(StorageError::Unsupported {
                operation: "in-place update of a variable-width or persisted segment",
            }),
        }
    }

    /// Raw payload of this segment for checkpointing.
    ///
    /// Fixed-width segments yield their little-endian value bytes;
    /// variable-width segments a msgpack image of their values.
    pub fn checkpoint_bytes(&self) -> Result<Vec<u8>> {
        let count = self.count() as usize;
        match &self.data {
            SegmentData::Fixed(handle) => {
                let pin = handle.pin()?;
                let bytes = pin.read();
                Ok(bytes[..count * self.type_size].to_vec())
            }
            SegmentData::Strings(strings) => {
                rmp_serde::to_vec(&strings.read()[..count]).map_err(|e| StorageError::Serialize {
                    what: "string segment",
                    detail: e.to_string(),
                })
            }
            SegmentData::Blobs(blobs) => {
                rmp_serde::to_vec(&blobs.read()[..count]).map_err(|e| StorageError::Serialize {
                    what: "blob segment",
                    detail: e.to_string(),
                })
            }
            SegmentData::Persistent { .. } => Err(StorageError::Unsupported {
                operation: "checkpoint of an already-persisted segment",
            }),
        }
    }

    /// Decode a persisted segment back into values.
    fn decompress(&self) -> Result<Vec<Value>> {
        let SegmentData::Persistent { handle, pointer } = &self.data else {
            return Err(StorageError::Unsupported {
                operation: "decompress of an in-memory segment",
            });
        };
        let pin = handle.pin()?;
        let bytes = pin.read();
        let start = pointer.block_pointer.offset as usize;
        let end = start + pointer.segment_size as usize;
        let payload = &bytes[start..end];
        decode_segment(
            &self.ty,
            self.physical,
            pointer.compression,
            pointer.tuple_count,
            payload,
        )
    }
}

fn schema_error(e: oxbow_types::VectorError) -> StorageError {
    StorageError::SchemaMismatch {
        detail: e.to_string(),
    }
}

/// Encode one value as little-endian bytes of its physical type.
/// NULLs encode as zero bytes; validity is tracked by the validity column.
pub(crate) fn encode_fixed(value: &Value, physical: PhysicalType, out: &mut [u8]) {
    match physical {
        PhysicalType::Bool => {
            out[0] = matches!(value, Value::Boolean(true)) as u8;
        }
        PhysicalType::Int8 => out[0] = value.as_i64().unwrap_or(0) as i8 as u8,
        PhysicalType::UInt8 => out[0] = value.as_u64().unwrap_or(0) as u8,
        PhysicalType::Int16 => {
            LittleEndian::write_i16(out, value.as_i64().unwrap_or(0) as i16)
        }
        PhysicalType::UInt16 => {
            LittleEndian::write_u16(out, value.as_u64().unwrap_or(0) as u16)
        }
        PhysicalType::Int32 => {
            LittleEndian::write_i32(out, value.as_i64().unwrap_or(0) as i32)
        }
        PhysicalType::UInt32 => {
            LittleEndian::write_u32(out, value.as_u64().unwrap_or(0) as u32)
        }
        PhysicalType::Int64 => LittleEndian::write_i64(out, value.as_i64().unwrap_or(0)),
        PhysicalType::UInt64 => LittleEndian::write_u64(out, value.as_u64().unwrap_or(0)),
        PhysicalType::Int128 => {
            let v = match value {
                Value::Int128(v) => *v,
                Value::Decimal { value, .. } => *value,
                other => other.as_i64().unwrap_or(0) as i128,
            };
            out[..16].copy_from_slice(&v.to_le_bytes());
        }
        PhysicalType::UInt128 => {
            let v = match value {
                Value::UInt128(v) => *v,
                other => other.as_u64().unwrap_or(0) as u128,
            };
            out[..16].copy_from_slice(&v.to_le_bytes());
        }
        PhysicalType::Float32 => {
            LittleEndian::write_f32(out, value.as_f64().unwrap_or(0.0) as f32)
        }
        PhysicalType::Float64 => LittleEndian::write_f64(out, value.as_f64().unwrap_or(0.0)),
        PhysicalType::Varchar
        | PhysicalType::Blob
        | PhysicalType::List
        | PhysicalType::Array
        | PhysicalType::Struct
        | PhysicalType::Invalid => {
            debug_assert!(false, "variable-width type in fixed encoder");
        }
    }
}

/// Decode little-endian bytes back into a value of the given logical type.
pub(crate) fn decode_fixed(ty: &LogicalType, bytes: &[u8]) -> Value {
    match ty.physical_type() {
        PhysicalType::Bool => Value::Boolean(bytes[0] != 0),
        PhysicalType::Int8 => Value::Int8(bytes[0] as i8),
        PhysicalType::UInt8 => Value::UInt8(bytes[0]),
        PhysicalType::Int16 => Value::Int16(LittleEndian::read_i16(bytes)),
        PhysicalType::UInt16 => Value::UInt16(LittleEndian::read_u16(bytes)),
        PhysicalType::Int32 => Value::Int32(LittleEndian::read_i32(bytes)),
        PhysicalType::UInt32 => Value::UInt32(LittleEndian::read_u32(bytes)),
        PhysicalType::Int64 => {
            let v = LittleEndian::read_i64(bytes);
            match ty {
                LogicalType::Timestamp => Value::Timestamp(v),
                _ => Value::Int64(v),
            }
        }
        PhysicalType::UInt64 => Value::UInt64(LittleEndian::read_u64(bytes)),
        PhysicalType::Int128 => {
            let mut buf = [0u8; 16];
            buf.copy_from_slice(&bytes[..16]);
            let v = i128::from_le_bytes(buf);
            match ty {
                LogicalType::Decimal { width, scale } => Value::Decimal {
                    value: v,
                    width: *width,
                    scale: *scale,
                },
                _ => Value::Int128(v),
            }
        }
        PhysicalType::UInt128 => {
            let mut buf = [0u8; 16];
            buf.copy_from_slice(&bytes[..16]);
            Value::UInt128(u128::from_le_bytes(buf))
        }
        PhysicalType::Float32 => Value::Float32(LittleEndian::read_f32(bytes)),
        PhysicalType::Float64 => Value::Float64(LittleEndian::read_f64(bytes)),
        _ => Value::Null,
    }
}

/// Decode a persisted segment payload into values.
pub(crate) fn decode_segment(
    ty: &LogicalType,
    physical: PhysicalType,
    compression: CompressionType,
    tuple_count: u64,
    payload: &[u8],
) -> Result<Vec<Value>> {
    let count = tuple_count as usize;
    match physical.fixed_size() {
        None => {
            // variable width: msgpack image, always uncompressed
            if physical == PhysicalType::Varchar {
                let strings: Vec<String> =
                    rmp_serde::from_slice(payload).map_err(|e| StorageError::Deserialize {
                        what: "string segment",
                        detail: e.to_string(),
                    })?;
                Ok(strings.into_iter().map(Value::String).collect())
            } else {
                let blobs: Vec<Vec<u8>> =
                    rmp_serde::from_slice(payload).map_err(|e| StorageError::Deserialize {
                        what: "blob segment",
                        detail: e.to_string(),
                    })?;
                Ok(blobs.into_iter().map(Value::Blob).collect())
            }
        }
        Some(type_size) => match compression {
            CompressionType::Uncompressed => {
                check_payload(payload.len(), count * type_size)?;
                Ok((0..count)
                    .map(|i| decode_fixed(ty, &payload[i * type_size..(i + 1) * type_size]))
                    .collect())
            }
            CompressionType::Constant => {
                check_payload(payload.len(), type_size)?;
                let value = decode_fixed(ty, &payload[..type_size]);
                Ok(vec![value; count])
            }
            CompressionType::Rle => {
                check_payload(payload.len(), 4)?;
                let num_runs = LittleEndian::read_u32(&payload[0..4]) as usize;
                let entry = type_size + 4;
                check_payload(payload.len(), 4 + num_runs * entry)?;
                let mut values = Vec::with_capacity(count);
                for run in 0..num_runs {
                    let at = 4 + run * entry;
                    let value = decode_fixed(ty, &payload[at..at + type_size]);
                    let run_len = LittleEndian::read_u32(&payload[at + type_size..at + entry]);
                    for _ in 0..run_len {
                        values.push(value.clone());
                    }
                }
                if values.len() != count {
                    return Err(StorageError::corrupted(
                        "rle segment",
                        format!("runs decode to {} rows, expected {count}", values.len()),
                    ));
                }
                Ok(values)
            }
            CompressionType::Dictionary => {
                check_payload(payload.len(), 2)?;
                let num_unique = LittleEndian::read_u16(&payload[0..2]) as usize;
                let index_size: usize = if num_unique <= 256 { 1 } else { 2 };
                check_payload(
                    payload.len(),
                    2 + num_unique * type_size + count * index_size,
                )?;
                let dict: Vec<Value> = (0..num_unique)
                    .map(|i| {
                        let at = 2 + i * type_size;
                        decode_fixed(ty, &payload[at..at + type_size])
                    })
                    .collect();
                let indices_at = 2 + num_unique * type_size;
                let mut values = Vec::with_capacity(count);
                for i in 0..count {
                    let idx = if index_size == 1 {
                        payload[indices_at + i] as usize
                    } else {
                        LittleEndian::read_u16(&payload[indices_at + i * 2..indices_at + i * 2 + 2])
                            as usize
                    };
                    let value = dict.get(idx).cloned().ok_or_else(|| {
                        StorageError::corrupted("dictionary segment", "index out of range")
                    })?;
                    values.push(value);
                }
                Ok(values)
            }
        },
    }
}

fn check_payload(actual: usize, needed: usize) -> Result<()> {
    if actual < needed {
        return Err(StorageError::corrupted(
            "segment payload",
            format!("{actual} bytes present, {needed} required"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Arc<BufferPool> {
        BufferPool::new(1 << 30)
    }

    fn int64_vector(values: &[i64]) -> Vector {
        let mut v = Vector::new(LogicalType::Int64);
        for &x in values {
            v.push(Value::Int64(x)).unwrap();
        }
        v
    }

    #[test]
    fn append_scan_fetch() {
        let pool = pool();
        let segment = ColumnSegment::new_in_memory(&pool, LogicalType::Int64, 0, 4096);
        let data: Vec<i64> = (1..=100).collect();
        let appended = segment.append(&int64_vector(&data), 0, 100).unwrap();
        assert_eq!(appended, 100);
        assert_eq!(segment.count(), 100);

        let mut out = Vector::new(LogicalType::Int64);
        segment.scan(&mut out, 10, 5).unwrap();
        assert_eq!(out.value(0), Value::Int64(11));
        assert_eq!(out.value(4), Value::Int64(15));

        assert_eq!(segment.fetch_row(99).unwrap(), Value::Int64(100));
    }

    #[test]
    fn append_stops_at_capacity() {
        let pool = pool();
        // room for exactly 8 i64 values
        let segment = ColumnSegment::new_in_memory(&pool, LogicalType::Int64, 0, 64);
        let data: Vec<i64> = (0..20).collect();
        let appended = segment.append(&int64_vector(&data), 0, 20).unwrap();
        assert_eq!(appended, 8);
        assert_eq!(segment.append(&int64_vector(&data), 8, 12).unwrap(), 0);
    }

    #[test]
    fn per_segment_statistics_populated_during_append() {
        let pool = pool();
        let segment = ColumnSegment::new_in_memory(&pool, LogicalType::Int64, 0, 4096);
        let data: Vec<i64> = (1..=100).collect();
        segment.append(&int64_vector(&data), 0, 100).unwrap();
        let stats = segment.segment_statistics();
        assert!(stats.has_stats());
        assert_eq!(stats.min_value(), Some(&Value::Int64(1)));
        assert_eq!(stats.max_value(), Some(&Value::Int64(100)));
    }

    #[test]
    fn fixed_width_update_row() {
        let pool = pool();
        let segment = ColumnSegment::new_in_memory(&pool, LogicalType::Int64, 0, 4096);
        segment.append(&int64_vector(&[1, 2, 3]), 0, 3).unwrap();
        segment.update_row(1, &Value::Int64(42)).unwrap();
        assert_eq!(segment.fetch_row(1).unwrap(), Value::Int64(42));
    }

    #[test]
    fn variable_width_update_is_unsupported() {
        let pool = pool();
        let segment = ColumnSegment::new_in_memory(&pool, LogicalType::String, 0, 4096);
        let mut v = Vector::new(LogicalType::String);
        v.push(Value::String("a".into())).unwrap();
        segment.append(&v, 0, 1).unwrap();
        assert!(matches!(
            segment.update_row(0, &Value::String("b".into())),
            Err(StorageError::Unsupported { .. })
        ));
    }

    #[test]
    fn string_segment_round_trip() {
        let pool = pool();
        let segment = ColumnSegment::new_in_memory(&pool, LogicalType::String, 0, 4096);
        let mut v = Vector::new(LogicalType::String);
        for i in 0..10 {
            v.push(Value::String(format!("name_{i}"))).unwrap();
        }
        segment.append(&v, 0, 10).unwrap();
        assert_eq!(
            segment.fetch_row(7).unwrap(),
            Value::String("name_7".into())
        );
    }

    #[test]
    fn decode_rle_payload() {
        // runs: 5 x 7, 3 x 9
        let mut payload = Vec::new();
        payload.extend_from_slice(&2u32.to_le_bytes());
        payload.extend_from_slice(&7i64.to_le_bytes());
        payload.extend_from_slice(&5u32.to_le_bytes());
        payload.extend_from_slice(&9i64.to_le_bytes());
        payload.extend_from_slice(&3u32.to_le_bytes());
        let values = decode_segment(
            &LogicalType::Int64,
            PhysicalType::Int64,
            CompressionType::Rle,
            8,
            &payload,
        )
        .unwrap();
        assert_eq!(values[0], Value::Int64(7));
        assert_eq!(values[4], Value::Int64(7));
        assert_eq!(values[5], Value::Int64(9));
        assert_eq!(values.len(), 8);
    }

    #[test]
    fn decode_constant_payload() {
        let payload = 42i64.to_le_bytes().to_vec();
        let values = decode_segment(
            &LogicalType::Int64,
            PhysicalType::Int64,
            CompressionType::Constant,
            100,
            &payload,
        )
        .unwrap();
        assert_eq!(values.len(), 100);
        assert!(values.iter().all(|v| *v == Value::Int64(42)));
    }

    #[test]
    fn decode_dictionary_payload() {
        // dict [10, 20], indices [0, 1, 1, 0] with 1-byte indices
        let mut payload = Vec::new();
        payload.extend_from_slice(&2u16.to_le_bytes());
        payload.extend_from_slice(&10i64.to_le_bytes());
        payload.extend_from_slice(&20i64.to_le_bytes());
        payload.extend_from_slice(&[0u8, 1, 1, 0]);
        let values = decode_segment(
            &LogicalType::Int64,
            PhysicalType::Int64,
            CompressionType::Dictionary,
            4,
            &payload,
        )
        .unwrap();
        assert_eq!(
            values,
            vec![
                Value::Int64(10),
                Value::Int64(20),
                Value::Int64(20),
                Value::Int64(10)
            ]
        );
    }
}
