//! Checkpoint pipeline: packs dirty segments into shared blocks and picks a
//! compression for each.

use std::collections::BTreeMap;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

use crate::block::{BlockManager, BlockPointer};
use crate::error::Result;
use crate::segment::{ColumnSegment, CompressionType, DataPointer};

/// Segments larger than this fraction of a block get a dedicated block;
/// smaller ones are packed together.
pub const PARTIAL_BLOCK_FULL_THRESHOLD: f64 = 0.8;

/// Dictionary compression gives up beyond this many distinct values.
pub const MAX_DICTIONARY_ENTRIES: usize = 65_535;

#[derive(Debug, Clone, Copy)]
pub struct PartialBlockAllocation {
    pub block_id: u64,
    pub offset: u32,
    pub size: u64,
}

#[derive(Debug)]
struct PartialBlock {
    block_id: u64,
    used_bytes: u32,
    capacity: u32,
}

/// Batches small checkpoint payloads into shared blocks.
///
/// Block images accumulate in memory and hit the block manager once, at
/// [`PartialBlockManager::flush`].
#[derive(Debug)]
pub struct PartialBlockManager {
    manager: Arc<BlockManager>,
    full_threshold: f64,
    partial_blocks: Vec<PartialBlock>,
    block_buffers: BTreeMap<u64, Vec<u8>>,
}

impl PartialBlockManager {
    pub fn new(manager: Arc<BlockManager>) -> Self {
        Self::with_threshold(manager, PARTIAL_BLOCK_FULL_THRESHOLD)
    }

    pub fn with_threshold(manager: Arc<BlockManager>, full_threshold: f64) -> Self {
        PartialBlockManager {
            manager,
            full_threshold,
            partial_blocks: Vec::new(),
            block_buffers: BTreeMap::new(),
        }
    }

    pub fn block_manager(&self) -> &Arc<BlockManager> {
        &self.manager
    }

    /// Find room for a payload of `segment_size` bytes.
    pub fn get_block_allocation(&mut self, segment_size: u64) -> Result<PartialBlockAllocation> {
        let block_size = self.manager.block_size() as u64;

        // large enough payloads get a block of their own
        if segment_size as f64 > block_size as f64 * self.full_threshold {
            let block_id = self.manager.free_block_id()?;
            return Ok(PartialBlockAllocation {
                block_id,
                offset: 0,
                size: segment_size,
            });
        }

        for pb in &mut self.partial_blocks {
            let remaining = (pb.capacity - pb.used_bytes) as u64;
            if remaining >= segment_size {
                let offset = pb.used_bytes;
                pb.used_bytes += segment_size as u32;
                return Ok(PartialBlockAllocation {
                    block_id: pb.block_id,
                    offset,
                    size: segment_size,
                });
            }
        }

        let block_id = self.manager.free_block_id()?;
        self.partial_blocks.push(PartialBlock {
            block_id,
            used_bytes: segment_size as u32,
            capacity: block_size as u32,
        });
        Ok(PartialBlockAllocation {
            block_id,
            offset: 0,
            size: segment_size,
        })
    }

    pub fn write_to_block(&mut self, block_id: u64, offset: u32, data: &[u8]) {
        let block_size = self.manager.block_size();
        let buffer = self
            .block_buffers
            .entry(block_id)
            .or_insert_with(|| vec![0; block_size]);
        buffer[offset as usize..offset as usize + data.len()].copy_from_slice(data);
    }

    /// Write every accumulated block image to the block manager.
    pub fn flush(&mut self) -> Result<()> {
        debug!(blocks = self.block_buffers.len(), "flushing partial blocks");
        for (&block_id, buffer) in &self.block_buffers {
            self.manager.write(buffer, block_id)?;
        }
        self.block_buffers.clear();
        self.partial_blocks.clear();
        Ok(())
    }
}

/// Flush one in-memory segment: pick a compression, place the payload
/// through the partial block manager, and describe it with a data pointer.
pub fn flush_segment(
    segment: &ColumnSegment,
    partial: &mut PartialBlockManager,
) -> Result<DataPointer> {
    // already-persisted segments are immutable: keep their blocks
    if let Some(pointer) = segment.data_pointer() {
        return Ok(pointer);
    }
    let raw = segment.checkpoint_bytes()?;
    let tuple_count = segment.count();
    let type_size = segment.type_size();

    let (compression, payload) = if type_size > 0 && tuple_count > 1 {
        select_compression(&raw, type_size, tuple_count as usize)
    } else {
        (CompressionType::Uncompressed, raw)
    };

    let allocation = partial.get_block_allocation(payload.len() as u64)?;
    partial.write_to_block(allocation.block_id, allocation.offset, &payload);

    Ok(DataPointer {
        row_start: segment.row_start(),
        tuple_count,
        block_pointer: BlockPointer::new(allocation.block_id, allocation.offset),
        compression,
        segment_size: payload.len() as u64,
        stats: segment.segment_statistics(),
    })
}

/// Compression selection: CONSTANT if all values are byte-identical, then
/// RLE if it wins over raw, then DICTIONARY for low-cardinality data, else
/// UNCOMPRESSED.
fn select_compression(raw: &[u8], type_size: usize, count: usize) -> (CompressionType, Vec<u8>) {
    if is_constant_data(raw, type_size, count) {
        return (CompressionType::Constant, raw[..type_size].to_vec());
    }

    let num_runs = count_runs(raw, type_size, count);
    let entry_size = type_size + 4;
    let rle_size = 4 + num_runs as usize * entry_size;
    let uncompressed_size = type_size * count;
    if rle_size < uncompressed_size {
        return (CompressionType::Rle, build_rle(raw, type_size, count, num_runs));
    }

    if let Some((dict, size)) = analyze_dictionary(raw, type_size, count) {
        if dict.len() > 1 && size < uncompressed_size {
            return (
                CompressionType::Dictionary,
                build_dictionary(raw, type_size, count, &dict),
            );
        }
    }

    (CompressionType::Uncompressed, raw.to_vec())
}

fn value_at(raw: &[u8], type_size: usize, i: usize) -> &[u8] {
    &raw[i * type_size..(i + 1) * type_size]
}

fn is_constant_data(raw: &[u8], type_size: usize, count: usize) -> bool {
    if count <= 1 {
        return true;
    }
    let first = value_at(raw, type_size, 0);
    (1..count).all(|i| value_at(raw, type_size, i) == first)
}

fn count_runs(raw: &[u8], type_size: usize, count: usize) -> u32 {
    if count == 0 {
        return 0;
    }
    let mut runs = 1u32;
    for i in 1..count {
        if value_at(raw, type_size, i) != value_at(raw, type_size, i - 1) {
            runs += 1;
        }
    }
    runs
}

/// `[num_runs u32][value bytes + run_length u32]*`
fn build_rle(raw: &[u8], type_size: usize, count: usize, num_runs: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + num_runs as usize * (type_size + 4));
    out.extend_from_slice(&num_runs.to_le_bytes());
    let mut run_length = 1u32;
    for i in 1..=count {
        if i < count && value_at(raw, type_size, i) == value_at(raw, type_size, i - 1) {
            run_length += 1;
        } else {
            out.extend_from_slice(value_at(raw, type_size, i - 1));
            out.extend_from_slice(&run_length.to_le_bytes());
            run_length = 1;
        }
    }
    out
}

/// Distinct-value table, or `None` when the cardinality blows the cap.
fn analyze_dictionary(
    raw: &[u8],
    type_size: usize,
    count: usize,
) -> Option<(BTreeMap<Vec<u8>, u16>, usize)> {
    let mut mapping = BTreeMap::new();
    let mut next_index = 0u16;
    for i in 0..count {
        let key = value_at(raw, type_size, i).to_vec();
        if !mapping.contains_key(&key) {
            if mapping.len() >= MAX_DICTIONARY_ENTRIES {
                return None;
            }
            mapping.insert(key, next_index);
            next_index += 1;
        }
    }
    let num_unique = mapping.len();
    let index_size = if num_unique <= 256 { 1 } else { 2 };
    let compressed_size = 2 + num_unique * type_size + count * index_size;
    Some((mapping, compressed_size))
}

/// `[num_unique u16][value_0 .. value_{n-1}][index per row, 1 or 2 bytes]`
fn build_dictionary(
    raw: &[u8],
    type_size: usize,
    count: usize,
    mapping: &BTreeMap<Vec<u8>, u16>,
) -> Vec<u8> {
    let num_unique = mapping.len();
    let index_size = if num_unique <= 256 { 1 } else { 2 };
    let mut out = Vec::with_capacity(2 + num_unique * type_size + count * index_size);
    out.extend_from_slice(&(num_unique as u16).to_le_bytes());

    let mut ordered: Vec<&[u8]> = vec![&[]; num_unique];
    for (key, &idx) in mapping {
        ordered[idx as usize] = key;
    }
    for value in ordered {
        out.extend_from_slice(value);
    }

    for i in 0..count {
        let idx = mapping[value_at(raw, type_size, i)];
        if index_size == 1 {
            out.push(idx as u8);
        } else {
            let mut buf = [0u8; 2];
            LittleEndian::write_u16(&mut buf, idx);
            out.extend_from_slice(&buf);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPool;
    use crate::segment::decode_segment;
    use oxbow_types::{LogicalType, PhysicalType, Value, Vector};
    use tempfile::tempdir;

    fn raw_i64(values: &[i64]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn constant_wins_for_identical_values() {
        let raw = raw_i64(&[5; 100]);
        let (compression, payload) = select_compression(&raw, 8, 100);
        assert_eq!(compression, CompressionType::Constant);
        assert_eq!(payload.len(), 8);
    }

    #[test]
    fn rle_wins_for_runs() {
        let mut values = vec![1i64; 50];
        values.extend(vec![2i64; 50]);
        let raw = raw_i64(&values);
        let (compression, payload) = select_compression(&raw, 8, 100);
        assert_eq!(compression, CompressionType::Rle);
        let decoded = decode_segment(
            &LogicalType::Int64,
            PhysicalType::Int64,
            compression,
            100,
            &payload,
        )
        .unwrap();
        assert_eq!(decoded[0], Value::Int64(1));
        assert_eq!(decoded[99], Value::Int64(2));
    }

    #[test]
    fn dictionary_wins_for_low_cardinality_without_runs() {
        // alternate 16 distinct values so RLE degenerates
        let values: Vec<i64> = (0..512).map(|i| (i % 16) as i64).collect();
        let raw = raw_i64(&values);
        let (compression, payload) = select_compression(&raw, 8, 512);
        assert_eq!(compression, CompressionType::Dictionary);
        let decoded = decode_segment(
            &LogicalType::Int64,
            PhysicalType::Int64,
            compression,
            512,
            &payload,
        )
        .unwrap();
        for (i, value) in decoded.iter().enumerate() {
            assert_eq!(*value, Value::Int64((i % 16) as i64));
        }
    }

    #[test]
    fn unique_values_stay_uncompressed() {
        let values: Vec<i64> = (0..64).collect();
        let raw = raw_i64(&values);
        let (compression, payload) = select_compression(&raw, 8, 64);
        assert_eq!(compression, CompressionType::Uncompressed);
        assert_eq!(payload, raw);
    }

    #[test]
    fn partial_blocks_pack_small_payloads() {
        let dir = tempdir().unwrap();
        let manager = Arc::new(
            BlockManager::create_file(dir.path().join("cp.oxb"), 4096).unwrap(),
        );
        let mut partial = PartialBlockManager::new(Arc::clone(&manager));

        let a = partial.get_block_allocation(100).unwrap();
        let b = partial.get_block_allocation(200).unwrap();
        // both fit in one shared block
        assert_eq!(a.block_id, b.block_id);
        assert_eq!(a.offset, 0);
        assert_eq!(b.offset, 100);

        // above the threshold gets a dedicated block
        let big = partial.get_block_allocation(4000).unwrap();
        assert_ne!(big.block_id, a.block_id);
        assert_eq!(big.offset, 0);
    }

    #[test]
    fn flush_segment_produces_readable_pointer() {
        let dir = tempdir().unwrap();
        let manager = Arc::new(
            BlockManager::create_file(dir.path().join("cp.oxb"), 4096).unwrap(),
        );
        let pool = BufferPool::new(1 << 24);

        let segment = ColumnSegment::new_in_memory(&pool, LogicalType::Int64, 0, 4096);
        let mut v = Vector::new(LogicalType::Int64);
        for i in 0..100i64 {
            v.push(Value::Int64(i)).unwrap();
        }
        segment.append(&v, 0, 100).unwrap();

        let mut partial = PartialBlockManager::new(Arc::clone(&manager));
        let pointer = flush_segment(&segment, &mut partial).unwrap();
        partial.flush().unwrap();
        assert_eq!(pointer.tuple_count, 100);

        let loaded =
            ColumnSegment::persistent(&pool, Arc::clone(&manager), LogicalType::Int64, pointer);
        let mut out = Vector::new(LogicalType::Int64);
        loaded.scan(&mut out, 0, 100).unwrap();
        for i in 0..100 {
            assert_eq!(out.value(i), Value::Int64(i as i64));
        }
    }
}
