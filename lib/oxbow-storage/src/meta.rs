//! Metadata overlay: multiplexes small logical streams onto the block store.
//!
//! Catalog and table descriptors are far smaller than a block yet may span
//! blocks. A [`MetadataWriter`] allocates blocks on demand and chains them
//! with a `(block_id, offset)` pointer stored at the head of each block; a
//! [`MetadataReader`] follows the chain from the root pointer the writer
//! returned.

use std::collections::HashMap;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use parking_lot::Mutex;

use crate::block::{BlockManager, BlockPointer, INVALID_BLOCK};
use crate::error::{Result, StorageError};

/// Per-block chain header: next block id (u64) + next offset (u32).
const CHAIN_HEADER: usize = 12;

/// Caches metadata block images between writers, readers, and the final
/// flush to the block manager.
#[derive(Debug)]
pub struct MetadataManager {
    manager: Arc<BlockManager>,
    blocks: Mutex<HashMap<u64, Vec<u8>>>,
}

impl MetadataManager {
    pub fn new(manager: Arc<BlockManager>) -> Self {
        MetadataManager {
            manager,
            blocks: Mutex::new(HashMap::new()),
        }
    }

    pub fn block_manager(&self) -> &Arc<BlockManager> {
        &self.manager
    }

    fn allocate_block(&self) -> Result<u64> {
        let id = self.manager.free_block_id()?;
        let mut image = vec![0u8; self.manager.block_size()];
        LittleEndian::write_u64(&mut image[0..8], INVALID_BLOCK);
        self.blocks.lock().insert(id, image);
        Ok(id)
    }

    fn with_block<R>(&self, id: u64, f: impl FnOnce(&mut Vec<u8>) -> R) -> Result<R> {
        let mut blocks = self.blocks.lock();
        if !blocks.contains_key(&id) {
            let mut block = crate::block::Block::new(id, self.manager.block_size());
            self.manager.read(&mut block)?;
            blocks.insert(id, block.data);
        }
        Ok(f(blocks.get_mut(&id).expect("block just inserted")))
    }

    /// Write every cached metadata block image through the block manager.
    pub fn flush(&self) -> Result<()> {
        let blocks = self.blocks.lock();
        for (&id, image) in blocks.iter() {
            self.manager.write(image, id)?;
        }
        Ok(())
    }
}

/// Appends typed primitives and raw bytes to a fresh block chain.
#[derive(Debug)]
pub struct MetadataWriter<'a> {
    manager: &'a MetadataManager,
    root: BlockPointer,
    current_block: u64,
    offset: usize,
    capacity: usize,
}

impl<'a> MetadataWriter<'a> {
    pub fn new(manager: &'a MetadataManager) -> Self {
        MetadataWriter {
            manager,
            root: BlockPointer::invalid(),
            current_block: INVALID_BLOCK,
            offset: 0,
            capacity: manager.block_manager().block_size(),
        }
    }

    /// Root of the chain; valid once anything has been written.
    pub fn block_pointer(&self) -> BlockPointer {
        self.root
    }

    pub fn write_data(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            if self.current_block == INVALID_BLOCK || self.offset == self.capacity {
                self.advance_block()?;
            }
            let room = self.capacity - self.offset;
            let take = room.min(data.len());
            let offset = self.offset;
            self.manager.with_block(self.current_block, |image| {
                image[offset..offset + take].copy_from_slice(&data[..take]);
            })?;
            self.offset += take;
            data = &data[take..];
        }
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_data(&[value])
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, value);
        self.write_data(&buf)
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        let mut buf = [0u8; 8];
        LittleEndian::write_u64(&mut buf, value);
        self.write_data(&buf)
    }

    /// u32 length prefix + UTF-8 bytes.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_u32(value.len() as u32)?;
        self.write_data(value.as_bytes())
    }

    /// Length-prefixed raw byte run.
    pub fn write_blob(&mut self, value: &[u8]) -> Result<()> {
        self.write_u32(value.len() as u32)?;
        self.write_data(value)
    }

    /// Flush the chain's blocks to the block manager.
    pub fn flush(&mut self) -> Result<()> {
        self.manager.flush()
    }

    fn advance_block(&mut self) -> Result<()> {
        let next = self.manager.allocate_block()?;
        if self.current_block == INVALID_BLOCK {
            self.root = BlockPointer::new(next, CHAIN_HEADER as u32);
        } else {
            // patch the previous block's chain header to point at the new one
            self.manager.with_block(self.current_block, |image| {
                LittleEndian::write_u64(&mut image[0..8], next);
                LittleEndian::write_u32(&mut image[8..12], CHAIN_HEADER as u32);
            })?;
        }
        self.current_block = next;
        self.offset = CHAIN_HEADER;
        Ok(())
    }
}

/// Follows a metadata chain from its root pointer.
#[derive(Debug)]
pub struct MetadataReader<'a> {
    manager: &'a MetadataManager,
    current_block: u64,
    offset: usize,
    capacity: usize,
}

impl<'a> MetadataReader<'a> {
    pub fn new(manager: &'a MetadataManager, root: BlockPointer) -> Self {
        MetadataReader {
            manager,
            current_block: root.block_id,
            offset: root.offset as usize,
            capacity: manager.block_manager().block_size(),
        }
    }

    pub fn read_data(&mut self, out: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < out.len() {
            if self.current_block == INVALID_BLOCK {
                return Err(StorageError::corrupted(
                    "metadata chain",
                    "chain ended before the requested bytes",
                ));
            }
            if self.offset == self.capacity {
                self.follow_chain()?;
                continue;
            }
            let room = self.capacity - self.offset;
            let take = room.min(out.len() - filled);
            let offset = self.offset;
            self.manager.with_block(self.current_block, |image| {
                out[filled..filled + take].copy_from_slice(&image[offset..offset + take]);
            })?;
            self.offset += take;
            filled += take;
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_data(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_data(&mut buf)?;
        Ok(LittleEndian::read_u32(&buf))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_data(&mut buf)?;
        Ok(LittleEndian::read_u64(&buf))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let mut buf = vec![0u8; len];
        self.read_data(&mut buf)?;
        String::from_utf8(buf)
            .map_err(|_| StorageError::corrupted("metadata string", "invalid UTF-8"))
    }

    pub fn read_blob(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32()? as usize;
        let mut buf = vec![0u8; len];
        self.read_data(&mut buf)?;
        Ok(buf)
    }

    fn follow_chain(&mut self) -> Result<()> {
        let (next, next_offset) = self.manager.with_block(self.current_block, |image| {
            (
                LittleEndian::read_u64(&image[0..8]),
                LittleEndian::read_u32(&image[8..12]),
            )
        })?;
        self.current_block = next;
        self.offset = next_offset as usize;
        Ok(())
    }
}
