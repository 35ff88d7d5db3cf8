//! Fixed-size block I/O over a single database file.
//!
//! Block 0 of the file is the checksummed [`DatabaseHeader`]; data blocks
//! follow, addressed by a dense 64-bit id. Data block `n` lives at file
//! offset `(n + 1) * block_size`.

mod manager;

pub use manager::{BlockManager, InMemoryBlockManager, SingleFileBlockManager};

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};

/// Default size of one block: 256 KiB.
pub const DEFAULT_BLOCK_SIZE: usize = 262_144;

/// Sentinel for "no block".
pub const INVALID_BLOCK: u64 = u64::MAX;

/// A location inside a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPointer {
    pub block_id: u64,
    pub offset: u32,
}

impl BlockPointer {
    pub const fn new(block_id: u64, offset: u32) -> Self {
        BlockPointer { block_id, offset }
    }

    pub const fn invalid() -> Self {
        BlockPointer {
            block_id: INVALID_BLOCK,
            offset: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.block_id != INVALID_BLOCK
    }
}

impl Default for BlockPointer {
    fn default() -> Self {
        Self::invalid()
    }
}

/// A block-sized buffer paired with the id it belongs to.
#[derive(Debug)]
pub struct Block {
    pub id: u64,
    pub data: Vec<u8>,
}

impl Block {
    pub fn new(id: u64, block_size: usize) -> Self {
        Block {
            id,
            data: vec![0; block_size],
        }
    }
}

pub(crate) const HEADER_MAGIC: u32 = 0x4F58_424F; // "OXBO"
pub(crate) const HEADER_VERSION: u32 = 1;
/// Serialized header length: magic, version, block_size, next_free_block_id,
/// free_list_root, meta_root, checksum.
pub(crate) const HEADER_LEN: usize = 4 + 4 + 4 + 8 + 12 + 12 + 4;

/// The file header stored in block 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseHeader {
    pub magic: u32,
    pub version: u32,
    pub block_size: u32,
    pub next_free_block_id: u64,
    pub free_list_root: BlockPointer,
    pub meta_root: BlockPointer,
}

impl DatabaseHeader {
    pub fn new(block_size: u32) -> Self {
        DatabaseHeader {
            magic: HEADER_MAGIC,
            version: HEADER_VERSION,
            block_size,
            next_free_block_id: 0,
            free_list_root: BlockPointer::invalid(),
            meta_root: BlockPointer::invalid(),
        }
    }

    /// Serialize into a header image with a trailing CRC32 of the payload.
    pub fn serialize(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        LittleEndian::write_u32(&mut buf[0..4], self.magic);
        LittleEndian::write_u32(&mut buf[4..8], self.version);
        LittleEndian::write_u32(&mut buf[8..12], self.block_size);
        LittleEndian::write_u64(&mut buf[12..20], self.next_free_block_id);
        LittleEndian::write_u64(&mut buf[20..28], self.free_list_root.block_id);
        LittleEndian::write_u32(&mut buf[28..32], self.free_list_root.offset);
        LittleEndian::write_u64(&mut buf[32..40], self.meta_root.block_id);
        LittleEndian::write_u32(&mut buf[40..44], self.meta_root.offset);
        let checksum = crc32fast::hash(&buf[..HEADER_LEN - 4]);
        LittleEndian::write_u32(&mut buf[HEADER_LEN - 4..], checksum);
        buf
    }

    /// Parse and validate a header image; any single corrupted byte fails.
    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(StorageError::corrupted("database header", "short read"));
        }
        let stored = LittleEndian::read_u32(&buf[HEADER_LEN - 4..HEADER_LEN]);
        let computed = crc32fast::hash(&buf[..HEADER_LEN - 4]);
        if stored != computed {
            return Err(StorageError::corrupted(
                "database header",
                format!("checksum mismatch: stored {stored:#x}, computed {computed:#x}"),
            ));
        }
        let header = DatabaseHeader {
            magic: LittleEndian::read_u32(&buf[0..4]),
            version: LittleEndian::read_u32(&buf[4..8]),
            block_size: LittleEndian::read_u32(&buf[8..12]),
            next_free_block_id: LittleEndian::read_u64(&buf[12..20]),
            free_list_root: BlockPointer::new(
                LittleEndian::read_u64(&buf[20..28]),
                LittleEndian::read_u32(&buf[28..32]),
            ),
            meta_root: BlockPointer::new(
                LittleEndian::read_u64(&buf[32..40]),
                LittleEndian::read_u32(&buf[40..44]),
            ),
        };
        if !header.validate() {
            return Err(StorageError::corrupted(
                "database header",
                format!("bad magic {:#x} or version {}", header.magic, header.version),
            ));
        }
        Ok(header)
    }

    pub fn validate(&self) -> bool {
        self.magic == HEADER_MAGIC && self.version == HEADER_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let mut header = DatabaseHeader::new(DEFAULT_BLOCK_SIZE as u32);
        header.next_free_block_id = 17;
        header.meta_root = BlockPointer::new(3, 128);
        let buf = header.serialize();
        let back = DatabaseHeader::deserialize(&buf).unwrap();
        assert_eq!(header, back);
    }

    #[test]
    fn any_single_byte_corruption_is_detected() {
        let header = DatabaseHeader::new(DEFAULT_BLOCK_SIZE as u32);
        let buf = header.serialize();
        for i in 0..HEADER_LEN {
            let mut corrupt = buf;
            corrupt[i] ^= 0xFF;
            assert!(
                DatabaseHeader::deserialize(&corrupt).is_err(),
                "corruption at byte {i} went undetected"
            );
        }
    }
}
