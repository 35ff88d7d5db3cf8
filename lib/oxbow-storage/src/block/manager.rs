use std::collections::{BTreeSet, HashMap};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use snafu::ResultExt;
use tracing::{debug, trace};

use super::{Block, BlockPointer, DatabaseHeader, DEFAULT_BLOCK_SIZE, HEADER_LEN};
use crate::error::{IoSnafu, Result, StorageError};

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(0);

/// Owner of the blocks of one database: either a single on-disk file or a
/// purely in-memory store that refuses every I/O call.
#[derive(Debug)]
pub enum BlockManager {
    SingleFile(SingleFileBlockManager),
    InMemory(InMemoryBlockManager),
}

impl BlockManager {
    /// Identifier distinguishing block managers inside one process, used to
    /// key buffer-pool frames.
    pub fn manager_id(&self) -> u64 {
        match self {
            BlockManager::SingleFile(m) => m.manager_id,
            BlockManager::InMemory(m) => m.manager_id,
        }
    }

    pub fn block_size(&self) -> usize {
        match self {
            BlockManager::SingleFile(m) => m.block_size,
            BlockManager::InMemory(m) => m.block_size,
        }
    }

    pub fn in_memory(&self) -> bool {
        matches!(self, BlockManager::InMemory(_))
    }

    pub fn free_block_id(&self) -> Result<u64> {
        match self {
            BlockManager::SingleFile(m) => Ok(m.free_block_id()),
            BlockManager::InMemory(m) => m.refuse("free_block_id"),
        }
    }

    pub fn peek_free_block_id(&self) -> Result<u64> {
        match self {
            BlockManager::SingleFile(m) => Ok(m.peek_free_block_id()),
            BlockManager::InMemory(m) => m.refuse("peek_free_block_id"),
        }
    }

    pub fn mark_as_free(&self, id: u64) -> Result<()> {
        match self {
            BlockManager::SingleFile(m) => {
                m.mark_as_free(id);
                Ok(())
            }
            BlockManager::InMemory(m) => m.refuse("mark_as_free"),
        }
    }

    pub fn mark_as_used(&self, id: u64) -> Result<()> {
        match self {
            BlockManager::SingleFile(m) => {
                m.mark_as_used(id);
                Ok(())
            }
            BlockManager::InMemory(m) => m.refuse("mark_as_used"),
        }
    }

    pub fn mark_as_modified(&self, id: u64) -> Result<()> {
        match self {
            BlockManager::SingleFile(m) => {
                m.mark_as_modified(id);
                Ok(())
            }
            BlockManager::InMemory(m) => m.refuse("mark_as_modified"),
        }
    }

    pub fn increase_block_ref_count(&self, id: u64) -> Result<()> {
        match self {
            BlockManager::SingleFile(m) => {
                m.increase_block_ref_count(id);
                Ok(())
            }
            BlockManager::InMemory(m) => m.refuse("increase_block_ref_count"),
        }
    }

    /// Read the block `block.id` into `block.data`.
    pub fn read(&self, block: &mut Block) -> Result<()> {
        match self {
            BlockManager::SingleFile(m) => m.read(block),
            BlockManager::InMemory(m) => m.refuse("read"),
        }
    }

    /// Write `data` (one block) at block id `id`.
    pub fn write(&self, data: &[u8], id: u64) -> Result<()> {
        match self {
            BlockManager::SingleFile(m) => m.write(data, id),
            BlockManager::InMemory(m) => m.refuse("write"),
        }
    }

    /// Allocate a fresh file-backed block for an existing buffer.
    pub fn create_block(&self, data: Vec<u8>) -> Result<Block> {
        match self {
            BlockManager::SingleFile(m) => {
                let id = m.free_block_id();
                Ok(Block { id, data })
            }
            BlockManager::InMemory(m) => m.refuse("create_block"),
        }
    }

    /// Re-home an existing buffer onto the given block id.
    pub fn convert_block(&self, id: u64, data: Vec<u8>) -> Result<Block> {
        match self {
            BlockManager::SingleFile(m) => {
                m.mark_as_used(id);
                Ok(Block { id, data })
            }
            BlockManager::InMemory(m) => m.refuse("convert_block"),
        }
    }

    pub fn write_header(&self, header: &DatabaseHeader) -> Result<()> {
        match self {
            BlockManager::SingleFile(m) => m.write_header(header),
            BlockManager::InMemory(m) => m.refuse("write_header"),
        }
    }

    pub fn header(&self) -> Result<DatabaseHeader> {
        match self {
            BlockManager::SingleFile(m) => Ok(m.header.lock().clone()),
            BlockManager::InMemory(m) => m.refuse("header"),
        }
    }

    pub fn file_sync(&self) -> Result<()> {
        match self {
            BlockManager::SingleFile(m) => m.file_sync(),
            BlockManager::InMemory(m) => m.refuse("file_sync"),
        }
    }

    pub fn total_blocks(&self) -> Result<u64> {
        match self {
            BlockManager::SingleFile(m) => Ok(m.total_blocks()),
            BlockManager::InMemory(m) => m.refuse("total_blocks"),
        }
    }

    pub fn free_blocks(&self) -> Result<u64> {
        match self {
            BlockManager::SingleFile(m) => Ok(m.free_blocks()),
            BlockManager::InMemory(m) => m.refuse("free_blocks"),
        }
    }
}

#[derive(Debug, Default)]
struct BlockState {
    free_list: BTreeSet<u64>,
    ref_counts: HashMap<u64, u32>,
    modified: BTreeSet<u64>,
}

/// Block manager over a single database file.
#[derive(Debug)]
pub struct SingleFileBlockManager {
    manager_id: u64,
    path: PathBuf,
    block_size: usize,
    file: Mutex<File>,
    state: Mutex<BlockState>,
    next_block_id: AtomicU64,
    header: Mutex<DatabaseHeader>,
}

impl SingleFileBlockManager {
    /// Create a new database file, truncating any existing one, and write
    /// the initial header.
    pub fn create(path: impl AsRef<Path>, block_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .context(IoSnafu {
                operation: "create database file",
            })?;
        debug!(path = %path.display(), block_size, "creating new database file");
        let manager = SingleFileBlockManager {
            manager_id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            path,
            block_size,
            file: Mutex::new(file),
            state: Mutex::new(BlockState::default()),
            next_block_id: AtomicU64::new(0),
            header: Mutex::new(DatabaseHeader::new(block_size as u32)),
        };
        let header = manager.header.lock().clone();
        manager.write_header(&header)?;
        Ok(manager)
    }

    /// Open an existing database file and validate its header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .context(IoSnafu {
                operation: "open database file",
            })?;
        let mut buf = vec![0u8; HEADER_LEN];
        file.read_exact_at(&mut buf, 0).context(IoSnafu {
            operation: "read database header",
        })?;
        let header = DatabaseHeader::deserialize(&buf)?;
        debug!(
            path = %path.display(),
            next_free_block_id = header.next_free_block_id,
            "loaded existing database file"
        );
        Ok(SingleFileBlockManager {
            manager_id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            path,
            block_size: header.block_size as usize,
            file: Mutex::new(file),
            state: Mutex::new(BlockState::default()),
            next_block_id: AtomicU64::new(header.next_free_block_id),
            header: Mutex::new(header),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hand out a free block id, preferring previously freed ids.
    pub fn free_block_id(&self) -> u64 {
        let mut state = self.state.lock();
        let id = match state.free_list.pop_first() {
            Some(id) => id,
            None => self.next_block_id.fetch_add(1, Ordering::SeqCst),
        };
        state.ref_counts.insert(id, 1);
        trace!(block_id = id, "allocated block");
        id
    }

    pub fn peek_free_block_id(&self) -> u64 {
        let state = self.state.lock();
        match state.free_list.first() {
            Some(&id) => id,
            None => self.next_block_id.load(Ordering::SeqCst),
        }
    }

    pub fn mark_as_free(&self, id: u64) {
        let mut state = self.state.lock();
        let count = state.ref_counts.entry(id).or_insert(1);
        *count = count.saturating_sub(1);
        if *count == 0 {
            state.ref_counts.remove(&id);
            state.free_list.insert(id);
            state.modified.insert(id);
        }
    }

    pub fn mark_as_used(&self, id: u64) {
        let mut state = self.state.lock();
        state.free_list.remove(&id);
        state.ref_counts.insert(id, 1);
        // keep the allocation cursor ahead of any explicitly used id
        let mut next = self.next_block_id.load(Ordering::SeqCst);
        while id >= next {
            match self.next_block_id.compare_exchange(
                next,
                id + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => next = actual,
            }
        }
    }

    pub fn mark_as_modified(&self, id: u64) {
        self.state.lock().modified.insert(id);
    }

    pub fn increase_block_ref_count(&self, id: u64) {
        let mut state = self.state.lock();
        *state.ref_counts.entry(id).or_insert(0) += 1;
    }

    pub fn read(&self, block: &mut Block) -> Result<()> {
        debug_assert_eq!(block.data.len(), self.block_size);
        let offset = self.data_offset(block.id);
        let file = self.file.lock();
        file.read_exact_at(&mut block.data, offset).context(IoSnafu {
            operation: "read block",
        })?;
        Ok(())
    }

    pub fn write(&self, data: &[u8], id: u64) -> Result<()> {
        if data.len() > self.block_size {
            return Err(StorageError::InvalidArgument {
                detail: format!(
                    "buffer of {} bytes exceeds block size {}",
                    data.len(),
                    self.block_size
                ),
            });
        }
        let offset = self.data_offset(id);
        let file = self.file.lock();
        file.write_all_at(data, offset).context(IoSnafu {
            operation: "write block",
        })?;
        Ok(())
    }

    /// Serialize the header to block 0 and fsync.
    pub fn write_header(&self, header: &DatabaseHeader) -> Result<()> {
        let mut image = vec![0u8; HEADER_LEN];
        image.copy_from_slice(&header.serialize());
        {
            let file = self.file.lock();
            file.write_all_at(&image, 0).context(IoSnafu {
                operation: "write header",
            })?;
            file.sync_all().context(IoSnafu {
                operation: "sync header",
            })?;
        }
        *self.header.lock() = header.clone();
        Ok(())
    }

    pub fn file_sync(&self) -> Result<()> {
        self.file.lock().sync_all().context(IoSnafu {
            operation: "file sync",
        })
    }

    /// Number of blocks ever allocated and still in use.
    pub fn total_blocks(&self) -> u64 {
        let state = self.state.lock();
        self.next_block_id.load(Ordering::SeqCst) - state.free_list.len() as u64
    }

    pub fn free_blocks(&self) -> u64 {
        self.state.lock().free_list.len() as u64
    }

    /// File offset of data block `id`: the header occupies block 0 of the
    /// file, data blocks follow it.
    fn data_offset(&self, id: u64) -> u64 {
        (id + 1) * self.block_size as u64
    }
}

/// Block manager of an in-memory database.
///
/// Tables in `IN_MEMORY` mode never persist, so every I/O entry point
/// answers [`StorageError::Unsupported`]; the only meaningful call is
/// `in_memory()`.
#[derive(Debug)]
pub struct InMemoryBlockManager {
    manager_id: u64,
    block_size: usize,
}

impl InMemoryBlockManager {
    pub fn new(block_size: usize) -> Self {
        InMemoryBlockManager {
            manager_id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            block_size,
        }
    }

    fn refuse<T>(&self, operation: &'static str) -> Result<T> {
        Err(StorageError::Unsupported { operation })
    }
}

impl Default for InMemoryBlockManager {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SIZE)
    }
}

/// Convenience constructors.
impl BlockManager {
    pub fn new_in_memory() -> Self {
        BlockManager::InMemory(InMemoryBlockManager::default())
    }

    pub fn create_file(path: impl AsRef<Path>, block_size: usize) -> Result<Self> {
        Ok(BlockManager::SingleFile(SingleFileBlockManager::create(
            path, block_size,
        )?))
    }

    pub fn open_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(BlockManager::SingleFile(SingleFileBlockManager::open(
            path,
        )?))
    }

    /// Root pointer of the serialized table metadata, from the header.
    pub fn meta_root(&self) -> Result<BlockPointer> {
        Ok(self.header()?.meta_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_and_read_blocks() {
        let dir = tempdir().unwrap();
        let bm = BlockManager::create_file(dir.path().join("test.oxb"), 4096).unwrap();

        let mut originals = Vec::new();
        for i in 0..5u64 {
            let id = bm.free_block_id().unwrap();
            let data: Vec<u8> = (0..4096).map(|j| ((i as usize * 37 + j * 13) & 0xFF) as u8).collect();
            bm.write(&data, id).unwrap();
            originals.push((id, data));
        }
        assert_eq!(bm.total_blocks().unwrap(), 5);

        for (id, data) in originals {
            let mut block = Block::new(id, 4096);
            bm.read(&mut block).unwrap();
            assert_eq!(block.data, data);
        }
    }

    #[test]
    fn create_close_load_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.oxb");
        {
            let bm = BlockManager::create_file(&path, 4096).unwrap();
            let id = bm.free_block_id().unwrap();
            bm.write(&vec![42u8; 4096], id).unwrap();
            let mut header = bm.header().unwrap();
            header.next_free_block_id = 1;
            bm.write_header(&header).unwrap();
        }
        {
            let bm = BlockManager::open_file(&path).unwrap();
            assert_eq!(bm.total_blocks().unwrap(), 1);
            let mut block = Block::new(0, 4096);
            bm.read(&mut block).unwrap();
            assert!(block.data.iter().all(|&b| b == 42));
        }
    }

    #[test]
    fn free_list_reuse() {
        let dir = tempdir().unwrap();
        let bm = BlockManager::create_file(dir.path().join("test.oxb"), 4096).unwrap();
        let id0 = bm.free_block_id().unwrap();
        let id1 = bm.free_block_id().unwrap();
        let id2 = bm.free_block_id().unwrap();
        assert_eq!((id0, id1, id2), (0, 1, 2));
        assert_eq!(bm.total_blocks().unwrap(), 3);

        bm.mark_as_free(id1).unwrap();
        assert_eq!(bm.free_blocks().unwrap(), 1);

        let id3 = bm.free_block_id().unwrap();
        assert_eq!(id3, id1);
        assert_eq!(bm.free_blocks().unwrap(), 0);
    }

    #[test]
    fn ref_counted_free() {
        let dir = tempdir().unwrap();
        let bm = BlockManager::create_file(dir.path().join("test.oxb"), 4096).unwrap();
        let id = bm.free_block_id().unwrap();
        bm.increase_block_ref_count(id).unwrap();
        bm.mark_as_free(id).unwrap();
        assert_eq!(bm.free_blocks().unwrap(), 0);
        bm.mark_as_free(id).unwrap();
        assert_eq!(bm.free_blocks().unwrap(), 1);
    }

    #[test]
    fn in_memory_refuses_io() {
        let bm = BlockManager::new_in_memory();
        assert!(bm.in_memory());
        assert!(matches!(
            bm.free_block_id(),
            Err(StorageError::Unsupported { .. })
        ));
        assert!(matches!(
            bm.write(&[0u8; 16], 0),
            Err(StorageError::Unsupported { .. })
        ));
        assert!(matches!(
            bm.file_sync(),
            Err(StorageError::Unsupported { .. })
        ));
    }
}
