//! Buffer pool: caps resident block memory and hands out pinned views.
//!
//! A [`BlockHandle`] names a block (file-backed or transient) and lazily
//! materializes its bytes. A [`BufferHandle`] is a short-lived pin: while it
//! lives, the frame stays resident and its bytes are reachable; dropping it
//! releases the pin. Handles are move-only; multiple pins on one block share
//! the same frame.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

use crate::block::{Block, BlockManager};
use crate::error::Result;

/// Shared bytes of one resident block.
#[derive(Debug)]
struct Frame {
    data: Arc<RwLock<Vec<u8>>>,
    pins: Arc<AtomicUsize>,
    modified: Arc<AtomicBool>,
}

#[derive(Debug)]
struct BlockHandleInner {
    pool: Arc<BufferPool>,
    /// `None` for transient frames that have no backing block.
    manager: Option<Arc<BlockManager>>,
    block_id: u64,
    size: usize,
    frame: Mutex<Option<Frame>>,
}

/// A reference to one block of one block manager, or to a transient
/// in-memory buffer of the pool.
#[derive(Debug, Clone)]
pub struct BlockHandle {
    inner: Arc<BlockHandleInner>,
}

/// A pin on a resident frame. Released on drop.
#[derive(Debug)]
pub struct BufferHandle {
    data: Arc<RwLock<Vec<u8>>>,
    pins: Arc<AtomicUsize>,
    modified: Arc<AtomicBool>,
}

impl BufferHandle {
    /// Read view of the pinned bytes.
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.data.read()
    }

    /// Write view of the pinned bytes; marks the frame dirty.
    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.modified.store(true, Ordering::Release);
        self.data.write()
    }
}

impl Drop for BufferHandle {
    fn drop(&mut self) {
        self.pins.fetch_sub(1, Ordering::AcqRel);
    }
}

impl BlockHandle {
    pub fn block_id(&self) -> u64 {
        self.inner.block_id
    }

    /// Pin the block, loading it from its block manager if it was evicted.
    pub fn pin(&self) -> Result<BufferHandle> {
        let mut slot = self.inner.frame.lock();
        if slot.is_none() {
            // reload from backing storage
            let manager = self
                .inner
                .manager
                .as_ref()
                .expect("transient frames are never evicted");
            let mut block = Block::new(self.inner.block_id, self.inner.size);
            manager.read(&mut block)?;
            trace!(block_id = self.inner.block_id, "reloaded evicted block");
            *slot = Some(Frame {
                data: Arc::new(RwLock::new(block.data)),
                pins: Arc::new(AtomicUsize::new(0)),
                modified: Arc::new(AtomicBool::new(false)),
            });
            self.inner.pool.charge(self.inner.size);
        }
        let frame = slot.as_ref().expect("frame just materialized");
        frame.pins.fetch_add(1, Ordering::AcqRel);
        let handle = BufferHandle {
            data: Arc::clone(&frame.data),
            pins: Arc::clone(&frame.pins),
            modified: Arc::clone(&frame.modified),
        };
        drop(slot);
        self.inner.pool.evict_if_needed();
        Ok(handle)
    }
}

/// Caps resident memory across all block managers of one database instance.
#[derive(Debug)]
pub struct BufferPool {
    max_memory: usize,
    used_memory: AtomicUsize,
    registry: Mutex<Vec<Weak<BlockHandleInner>>>,
    evictions: AtomicU64,
}

impl BufferPool {
    pub fn new(max_memory: usize) -> Arc<Self> {
        Arc::new(BufferPool {
            max_memory,
            used_memory: AtomicUsize::new(0),
            registry: Mutex::new(Vec::new()),
            evictions: AtomicU64::new(0),
        })
    }

    pub fn used_memory(&self) -> usize {
        self.used_memory.load(Ordering::Acquire)
    }

    pub fn eviction_count(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Allocate a transient frame that lives purely in memory.
    ///
    /// Transient frames back not-yet-checkpointed column segments; they have
    /// no on-disk home and are therefore never evicted, but they do count
    /// against the pool budget.
    pub fn allocate(self: &Arc<Self>, size: usize) -> BlockHandle {
        let inner = Arc::new(BlockHandleInner {
            pool: Arc::clone(self),
            manager: None,
            block_id: u64::MAX,
            size,
            frame: Mutex::new(Some(Frame {
                data: Arc::new(RwLock::new(vec![0; size])),
                pins: Arc::new(AtomicUsize::new(0)),
                modified: Arc::new(AtomicBool::new(false)),
            })),
        });
        self.charge(size);
        self.register(&inner);
        self.evict_if_needed();
        BlockHandle { inner }
    }

    /// Create a handle for an existing on-disk block; bytes load on first pin.
    pub fn register_block(self: &Arc<Self>, manager: Arc<BlockManager>, block_id: u64) -> BlockHandle {
        let size = manager.block_size();
        let inner = Arc::new(BlockHandleInner {
            pool: Arc::clone(self),
            manager: Some(manager),
            block_id,
            size,
            frame: Mutex::new(None),
        });
        self.register(&inner);
        BlockHandle { inner }
    }

    fn register(&self, inner: &Arc<BlockHandleInner>) {
        let mut registry = self.registry.lock();
        registry.retain(|weak| weak.strong_count() > 0);
        registry.push(Arc::downgrade(inner));
    }

    fn charge(&self, size: usize) {
        self.used_memory.fetch_add(size, Ordering::AcqRel);
    }

    fn discharge(&self, size: usize) {
        self.used_memory.fetch_sub(size, Ordering::AcqRel);
    }

    /// Evict resident, unpinned, file-backed frames until the pool fits its
    /// budget. Clean frames go first; dirty frames are flushed through their
    /// block manager before being dropped.
    fn evict_if_needed(&self) {
        if self.used_memory() <= self.max_memory {
            return;
        }
        let candidates: Vec<Arc<BlockHandleInner>> = {
            let registry = self.registry.lock();
            registry.iter().filter_map(Weak::upgrade).collect()
        };
        // clean frames first, dirty ones only if still over budget
        for pass_dirty in [false, true] {
            for inner in &candidates {
                if self.used_memory() <= self.max_memory {
                    return;
                }
                let Some(manager) = inner.manager.as_ref() else {
                    continue;
                };
                let mut slot = inner.frame.lock();
                let Some(frame) = slot.as_ref() else {
                    continue;
                };
                if frame.pins.load(Ordering::Acquire) > 0 {
                    continue;
                }
                let dirty = frame.modified.load(Ordering::Acquire);
                if dirty != pass_dirty {
                    continue;
                }
                if dirty {
                    let data = frame.data.read();
                    if manager.write(&data, inner.block_id).is_err() {
                        continue;
                    }
                }
                *slot = None;
                self.discharge(inner.size);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                trace!(block_id = inner.block_id, dirty, "evicted frame");
            }
        }
    }
}
