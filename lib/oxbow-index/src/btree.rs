//! Generic disk-backed B+tree over opaque, msgpack-encoded items.
//!
//! The tree orders items by an extracted [`IndexKey`] plus a 64-bit
//! discriminator (for secondary indexes: the row id), so duplicate keys are
//! distinct entries. Pages are fixed-size; leaves form a chain for range
//! scans. Deletion does not rebalance: emptied leaves stay in place until
//! the index file is dropped.

use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use parking_lot::Mutex;
use snafu::{ResultExt, Snafu};
use tracing::{debug, trace};

use crate::key::IndexKey;

pub const DEFAULT_PAGE_SIZE: usize = 4096;

const MAGIC: u32 = 0x4F58_4254; // "OXBT"
const VERSION: u32 = 1;
const INVALID_PAGE: u64 = u64::MAX;
const HEADER_LEN: usize = 4 + 4 + 4 + 8 + 8 + 8 + 8;

const KIND_LEAF: u8 = 1;
const KIND_INTERNAL: u8 = 2;

#[derive(Debug, Snafu)]
pub enum BTreeError {
    #[snafu(display("index I/O error during {operation}: {source}"))]
    Io {
        operation: &'static str,
        source: io::Error,
    },

    #[snafu(display("corrupted index file: {detail}"))]
    Corrupted { detail: String },

    #[snafu(display("item of {size} bytes cannot fit a {page_size}-byte page"))]
    ItemTooLarge { size: usize, page_size: usize },

    #[snafu(display("failed to encode index entry: {detail}"))]
    Encode { detail: String },
}

type Result<T, E = BTreeError> = std::result::Result<T, E>;

/// Extracts the ordering of one stored item: its key and a discriminator
/// that makes duplicates distinct.
pub type KeyExtractor = Arc<dyn Fn(&[u8]) -> (IndexKey, u64) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ItemOrd {
    key: IndexKey,
    discriminator: u64,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        items: Vec<Vec<u8>>,
        next: u64,
    },
    Internal {
        /// `separators[i]` is the smallest ordering in `children[i + 1]`.
        separators: Vec<ItemOrd>,
        children: Vec<u64>,
    },
}

#[derive(Debug, Clone, Copy)]
struct Header {
    root: u64,
    next_page_id: u64,
    free_head: u64,
    item_count: u64,
}

/// Disk B+tree with a configurable page size and key extractor.
pub struct DiskBTree {
    path: PathBuf,
    page_size: usize,
    extractor: KeyExtractor,
    file: Mutex<File>,
    header: Mutex<Header>,
    cache: Mutex<HashMap<u64, Node>>,
    dirty: Mutex<HashSet<u64>>,
}

impl std::fmt::Debug for DiskBTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskBTree")
            .field("path", &self.path)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl DiskBTree {
    /// Open (creating if absent) a B+tree file.
    pub fn open(
        path: impl AsRef<Path>,
        page_size: usize,
        extractor: KeyExtractor,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .context(IoSnafu {
                operation: "open index file",
            })?;
        let len = file.metadata().context(IoSnafu {
            operation: "stat index file",
        })?
        .len();

        let tree = DiskBTree {
            path,
            page_size,
            extractor,
            file: Mutex::new(file),
            header: Mutex::new(Header {
                root: INVALID_PAGE,
                next_page_id: 1,
                free_head: INVALID_PAGE,
                item_count: 0,
            }),
            cache: Mutex::new(HashMap::new()),
            dirty: Mutex::new(HashSet::new()),
        };
        if len == 0 {
            // fresh file: a single empty leaf as the root
            let root = tree.allocate_page()?;
            tree.store_node(
                root,
                Node::Leaf {
                    items: Vec::new(),
                    next: INVALID_PAGE,
                },
            );
            tree.header.lock().root = root;
            tree.flush()?;
        } else {
            tree.load_header()?;
        }
        debug!(path = %tree.path.display(), "opened index b+tree");
        Ok(tree)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn item_count(&self) -> u64 {
        self.header.lock().item_count
    }

    /// Insert one item; inserting a byte-identical ordering is a no-op.
    pub fn insert(&self, item: &[u8]) -> Result<()> {
        if item.len() + 16 > self.page_size {
            return Err(BTreeError::ItemTooLarge {
                size: item.len(),
                page_size: self.page_size,
            });
        }
        let ord = self.ord_of(item);
        let root = self.header.lock().root;
        let (inserted, split) = self.insert_into(root, item, &ord)?;
        if let Some((separator, new_page)) = split {
            let new_root = self.allocate_page()?;
            self.store_node(
                new_root,
                Node::Internal {
                    separators: vec![separator],
                    children: vec![root, new_page],
                },
            );
            self.header.lock().root = new_root;
        }
        if inserted {
            self.header.lock().item_count += 1;
        }
        Ok(())
    }

    /// Remove the item with this exact ordering. Returns true if removed.
    pub fn remove(&self, key: &IndexKey, discriminator: u64) -> Result<bool> {
        let ord = ItemOrd {
            key: key.clone(),
            discriminator,
        };
        let root = self.header.lock().root;
        let removed = self.remove_from(root, &ord)?;
        if removed {
            self.header.lock().item_count -= 1;
        }
        Ok(removed)
    }

    /// Remove every item stored under `key`. Returns how many were removed.
    pub fn remove_key(&self, key: &IndexKey) -> Result<u64> {
        let items = self.find(key)?;
        let mut removed = 0;
        for item in items {
            let (_, discriminator) = (self.extractor)(&item);
            if self.remove(key, discriminator)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Every item whose extracted key equals `key`.
    pub fn find(&self, key: &IndexKey) -> Result<Vec<Vec<u8>>> {
        self.collect_range(Some(key), |k| k == key, |k| k > key)
    }

    /// Every item whose extracted key is strictly less than `key`.
    pub fn scan_lt(&self, key: &IndexKey) -> Result<Vec<Vec<u8>>> {
        self.collect_range(None, |k| k < key, |k| k >= key)
    }

    /// Every item whose extracted key is strictly greater than `key`.
    pub fn scan_gt(&self, key: &IndexKey) -> Result<Vec<Vec<u8>>> {
        self.collect_range(Some(key), |k| k > key, |_| false)
    }

    /// Every item, in key order.
    pub fn scan_all(&self) -> Result<Vec<Vec<u8>>> {
        self.collect_range(None, |_| true, |_| false)
    }

    /// Reset the tree to a single empty leaf, discarding every item.
    pub fn clear(&self) -> Result<()> {
        self.cache.lock().clear();
        self.dirty.lock().clear();
        {
            let mut header = self.header.lock();
            header.root = 1;
            header.next_page_id = 2;
            header.free_head = INVALID_PAGE;
            header.item_count = 0;
        }
        self.store_node(
            1,
            Node::Leaf {
                items: Vec::new(),
                next: INVALID_PAGE,
            },
        );
        self.flush()
    }

    /// Write every dirty page and the header; fsync.
    pub fn flush(&self) -> Result<()> {
        let dirty: Vec<u64> = {
            let mut dirty = self.dirty.lock();
            dirty.drain().collect()
        };
        for page_id in dirty {
            let node = {
                let cache = self.cache.lock();
                cache.get(&page_id).cloned()
            };
            if let Some(node) = node {
                let image = self.serialize_node(&node)?;
                self.write_page(page_id, &image)?;
            }
        }
        self.write_header()?;
        self.file.lock().sync_all().context(IoSnafu {
            operation: "sync index file",
        })?;
        Ok(())
    }

    /// Delete the backing file.
    pub fn drop_file(self) -> Result<()> {
        let path = self.path.clone();
        drop(self);
        std::fs::remove_file(&path).context(IoSnafu {
            operation: "remove index file",
        })
    }

    // ---- tree walk ------------------------------------------------------

    fn ord_of(&self, item: &[u8]) -> ItemOrd {
        let (key, discriminator) = (self.extractor)(item);
        ItemOrd {
            key,
            discriminator,
        }
    }

    /// Returns (inserted, split): `split` carries the separator and page id
    /// of a freshly created right sibling.
    fn insert_into(
        &self,
        page_id: u64,
        item: &[u8],
        ord: &ItemOrd,
    ) -> Result<(bool, Option<(ItemOrd, u64)>)> {
        let node = self.load_node(page_id)?;
        match node {
            Node::Leaf { mut items, next } => {
                let position = items.binary_search_by(|existing| {
                    self.ord_of(existing).cmp(ord)
                });
                let insert_at = match position {
                    Ok(_) => return Ok((false, None)), // idempotent
                    Err(at) => at,
                };
                items.insert(insert_at, item.to_vec());
                if self.leaf_size(&items) <= self.page_size {
                    self.store_node(page_id, Node::Leaf { items, next });
                    return Ok((true, None));
                }
                // split: right sibling takes the upper half
                let mid = items.len() / 2;
                let right_items = items.split_off(mid);
                let separator = self.ord_of(&right_items[0]);
                let right_id = self.allocate_page()?;
                self.store_node(
                    right_id,
                    Node::Leaf {
                        items: right_items,
                        next,
                    },
                );
                self.store_node(
                    page_id,
                    Node::Leaf {
                        items,
                        next: right_id,
                    },
                );
                trace!(page_id, right_id, "split leaf");
                Ok((true, Some((separator, right_id))))
            }
            Node::Internal {
                mut separators,
                mut children,
            } => {
                let child_idx = child_index(&separators, ord);
                let child = children[child_idx];
                let (inserted, split) = self.insert_into(child, item, ord)?;
                if let Some((separator, new_page)) = split {
                    separators.insert(child_idx, separator);
                    children.insert(child_idx + 1, new_page);
                    if self.internal_size(&separators, &children)? <= self.page_size {
                        self.store_node(
                            page_id,
                            Node::Internal {
                                separators,
                                children,
                            },
                        );
                        return Ok((inserted, None));
                    }
                    // split the internal node; the middle separator moves up
                    let mid = separators.len() / 2;
                    let up = separators[mid].clone();
                    let right_separators = separators.split_off(mid + 1);
                    separators.pop();
                    let right_children = children.split_off(mid + 1);
                    let right_id = self.allocate_page()?;
                    self.store_node(
                        right_id,
                        Node::Internal {
                            separators: right_separators,
                            children: right_children,
                        },
                    );
                    self.store_node(
                        page_id,
                        Node::Internal {
                            separators,
                            children,
                        },
                    );
                    trace!(page_id, right_id, "split internal node");
                    return Ok((inserted, Some((up, right_id))));
                }
                Ok((inserted, None))
            }
        }
    }

    fn remove_from(&self, page_id: u64, ord: &ItemOrd) -> Result<bool> {
        let node = self.load_node(page_id)?;
        match node {
            Node::Leaf { mut items, next } => {
                let position = items.binary_search_by(|existing| {
                    self.ord_of(existing).cmp(ord)
                });
                match position {
                    Ok(at) => {
                        items.remove(at);
                        self.store_node(page_id, Node::Leaf { items, next });
                        Ok(true)
                    }
                    Err(_) => Ok(false),
                }
            }
            Node::Internal {
                separators,
                children,
            } => {
                let child_idx = child_index(&separators, ord);
                self.remove_from(children[child_idx], ord)
            }
        }
    }

    /// Walk the leaf chain collecting items for which `keep` holds,
    /// stopping as soon as `done` holds. `start_at` positions the walk at
    /// the leaf that could contain that key; `None` starts leftmost.
    fn collect_range(
        &self,
        start_at: Option<&IndexKey>,
        keep: impl Fn(&IndexKey) -> bool,
        done: impl Fn(&IndexKey) -> bool,
    ) -> Result<Vec<Vec<u8>>> {
        let mut page_id = self.leftmost_leaf_for(start_at)?;
        let mut out = Vec::new();
        while page_id != INVALID_PAGE {
            let node = self.load_node(page_id)?;
            let Node::Leaf { items, next } = node else {
                return Err(BTreeError::Corrupted {
                    detail: "leaf chain points at an internal node".into(),
                });
            };
            for item in &items {
                let (key, _) = (self.extractor)(item);
                if done(&key) {
                    return Ok(out);
                }
                if keep(&key) {
                    out.push(item.clone());
                }
            }
            page_id = next;
        }
        Ok(out)
    }

    fn leftmost_leaf_for(&self, key: Option<&IndexKey>) -> Result<u64> {
        let probe = key.map(|k| ItemOrd {
            key: k.clone(),
            discriminator: 0,
        });
        let mut page_id = self.header.lock().root;
        loop {
            match self.load_node(page_id)? {
                Node::Leaf { .. } => return Ok(page_id),
                Node::Internal {
                    separators,
                    children,
                } => {
                    page_id = match &probe {
                        Some(ord) => children[child_index(&separators, ord)],
                        None => children[0],
                    };
                }
            }
        }
    }

    // ---- page store -----------------------------------------------------

    fn allocate_page(&self) -> Result<u64> {
        let mut header = self.header.lock();
        if header.free_head != INVALID_PAGE {
            let page_id = header.free_head;
            drop(header);
            let mut buf = vec![0u8; 8];
            self.read_page_into(page_id, &mut buf[..8])?;
            self.header.lock().free_head = LittleEndian::read_u64(&buf[..8]);
            return Ok(page_id);
        }
        let page_id = header.next_page_id;
        header.next_page_id += 1;
        Ok(page_id)
    }

    fn load_node(&self, page_id: u64) -> Result<Node> {
        {
            let cache = self.cache.lock();
            if let Some(node) = cache.get(&page_id) {
                return Ok(node.clone());
            }
        }
        let mut image = vec![0u8; self.page_size];
        self.read_page_into(page_id, &mut image)?;
        let node = self.deserialize_node(&image)?;
        self.cache.lock().insert(page_id, node.clone());
        Ok(node)
    }

    fn store_node(&self, page_id: u64, node: Node) {
        self.cache.lock().insert(page_id, node);
        self.dirty.lock().insert(page_id);
    }

    fn read_page_into(&self, page_id: u64, buf: &mut [u8]) -> Result<()> {
        let offset = page_id * self.page_size as u64;
        self.file.lock().read_exact_at(buf, offset).context(IoSnafu {
            operation: "read index page",
        })
    }

    fn write_page(&self, page_id: u64, image: &[u8]) -> Result<()> {
        let offset = page_id * self.page_size as u64;
        self.file.lock().write_all_at(image, offset).context(IoSnafu {
            operation: "write index page",
        })
    }

    fn load_header(&self) -> Result<()> {
        let mut buf = vec![0u8; HEADER_LEN];
        {
            let file = self.file.lock();
            file.read_exact_at(&mut buf, 0).context(IoSnafu {
                operation: "read index header",
            })?;
        }
        if LittleEndian::read_u32(&buf[0..4]) != MAGIC {
            return Err(BTreeError::Corrupted {
                detail: "bad magic".into(),
            });
        }
        if LittleEndian::read_u32(&buf[4..8]) != VERSION {
            return Err(BTreeError::Corrupted {
                detail: "unsupported version".into(),
            });
        }
        let page_size = LittleEndian::read_u32(&buf[8..12]) as usize;
        if page_size != self.page_size {
            return Err(BTreeError::Corrupted {
                detail: format!(
                    "file page size {page_size} differs from configured {}",
                    self.page_size
                ),
            });
        }
        *self.header.lock() = Header {
            root: LittleEndian::read_u64(&buf[12..20]),
            next_page_id: LittleEndian::read_u64(&buf[20..28]),
            free_head: LittleEndian::read_u64(&buf[28..36]),
            item_count: LittleEndian::read_u64(&buf[36..44]),
        };
        Ok(())
    }

    fn write_header(&self) -> Result<()> {
        let header = *self.header.lock();
        let mut buf = vec![0u8; self.page_size.max(HEADER_LEN)];
        LittleEndian::write_u32(&mut buf[0..4], MAGIC);
        LittleEndian::write_u32(&mut buf[4..8], VERSION);
        LittleEndian::write_u32(&mut buf[8..12], self.page_size as u32);
        LittleEndian::write_u64(&mut buf[12..20], header.root);
        LittleEndian::write_u64(&mut buf[20..28], header.next_page_id);
        LittleEndian::write_u64(&mut buf[28..36], header.free_head);
        LittleEndian::write_u64(&mut buf[36..44], header.item_count);
        self.write_page(0, &buf[..self.page_size])
    }

    // ---- node codec -----------------------------------------------------

    fn leaf_size(&self, items: &[Vec<u8>]) -> usize {
        1 + 2 + 8 + items.iter().map(|i| 4 + i.len()).sum::<usize>()
    }

    fn internal_size(&self, separators: &[ItemOrd], children: &[u64]) -> Result<usize> {
        let mut size = 1 + 2 + children.len() * 8;
        for sep in separators {
            size += 4 + self.encode_separator(sep)?.len();
        }
        Ok(size)
    }

    fn encode_separator(&self, sep: &ItemOrd) -> Result<Vec<u8>> {
        rmp_serde::to_vec(&(&sep.key, sep.discriminator)).map_err(|e| BTreeError::Encode {
            detail: e.to_string(),
        })
    }

    fn serialize_node(&self, node: &Node) -> Result<Vec<u8>> {
        let mut image = vec![0u8; self.page_size];
        match node {
            Node::Leaf { items, next } => {
                image[0] = KIND_LEAF;
                LittleEndian::write_u16(&mut image[1..3], items.len() as u16);
                LittleEndian::write_u64(&mut image[3..11], *next);
                let mut at = 11;
                for item in items {
                    LittleEndian::write_u32(&mut image[at..at + 4], item.len() as u32);
                    at += 4;
                    image[at..at + item.len()].copy_from_slice(item);
                    at += item.len();
                }
            }
            Node::Internal {
                separators,
                children,
            } => {
                image[0] = KIND_INTERNAL;
                LittleEndian::write_u16(&mut image[1..3], children.len() as u16);
                let mut at = 3;
                for child in children {
                    LittleEndian::write_u64(&mut image[at..at + 8], *child);
                    at += 8;
                }
                for sep in separators {
                    let encoded = self.encode_separator(sep)?;
                    LittleEndian::write_u32(&mut image[at..at + 4], encoded.len() as u32);
                    at += 4;
                    image[at..at + encoded.len()].copy_from_slice(&encoded);
                    at += encoded.len();
                }
            }
        }
        Ok(image)
    }

    fn deserialize_node(&self, image: &[u8]) -> Result<Node> {
        match image[0] {
            KIND_LEAF => {
                let count = LittleEndian::read_u16(&image[1..3]) as usize;
                let next = LittleEndian::read_u64(&image[3..11]);
                let mut at = 11;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    let len = LittleEndian::read_u32(&image[at..at + 4]) as usize;
                    at += 4;
                    items.push(image[at..at + len].to_vec());
                    at += len;
                }
                Ok(Node::Leaf { items, next })
            }
            KIND_INTERNAL => {
                let child_count = LittleEndian::read_u16(&image[1..3]) as usize;
                let mut at = 3;
                let mut children = Vec::with_capacity(child_count);
                for _ in 0..child_count {
                    children.push(LittleEndian::read_u64(&image[at..at + 8]));
                    at += 8;
                }
                let mut separators = Vec::with_capacity(child_count.saturating_sub(1));
                for _ in 0..child_count.saturating_sub(1) {
                    let len = LittleEndian::read_u32(&image[at..at + 4]) as usize;
                    at += 4;
                    let (key, discriminator): (IndexKey, u64) =
                        rmp_serde::from_slice(&image[at..at + len]).map_err(|e| {
                            BTreeError::Corrupted {
                                detail: format!("separator decode failed: {e}"),
                            }
                        })?;
                    at += len;
                    separators.push(ItemOrd {
                        key,
                        discriminator,
                    });
                }
                Ok(Node::Internal {
                    separators,
                    children,
                })
            }
            other => Err(BTreeError::Corrupted {
                detail: format!("unknown page kind {other}"),
            }),
        }
    }
}

/// Index of the child that could contain `ord`.
fn child_index(separators: &[ItemOrd], ord: &ItemOrd) -> usize {
    separators
        .iter()
        .position(|sep| ord < sep)
        .unwrap_or(separators.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxbow_types::Value;
    use tempfile::tempdir;

    fn extractor() -> KeyExtractor {
        Arc::new(|item: &[u8]| {
            let (value, row_id): (Value, u64) =
                rmp_serde::from_slice(item).expect("test items are well formed");
            (IndexKey::from(value), row_id)
        })
    }

    fn item(value: i64, row_id: u64) -> Vec<u8> {
        rmp_serde::to_vec(&(Value::Int64(value), row_id)).unwrap()
    }

    fn row_of(item: &[u8]) -> u64 {
        let (_, row_id): (Value, u64) = rmp_serde::from_slice(item).unwrap();
        row_id
    }

    #[test]
    fn insert_find_bounds() {
        let dir = tempdir().unwrap();
        let tree = DiskBTree::open(dir.path().join("t.obt"), 512, extractor()).unwrap();
        for i in 1..=100i64 {
            tree.insert(&item(i, i as u64)).unwrap();
        }
        assert_eq!(tree.item_count(), 100);

        let found = tree.find(&IndexKey::from(Value::Int64(10))).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(row_of(&found[0]), 10);

        assert!(tree.find(&IndexKey::from(Value::Int64(101))).unwrap().is_empty());
        assert_eq!(tree.scan_lt(&IndexKey::from(Value::Int64(10))).unwrap().len(), 9);
        assert_eq!(tree.scan_gt(&IndexKey::from(Value::Int64(90))).unwrap().len(), 10);
    }

    #[test]
    fn insert_is_idempotent() {
        let dir = tempdir().unwrap();
        let tree = DiskBTree::open(dir.path().join("t.obt"), 512, extractor()).unwrap();
        tree.insert(&item(5, 50)).unwrap();
        tree.insert(&item(5, 50)).unwrap();
        assert_eq!(tree.item_count(), 1);
        // same key, different row: a distinct entry
        tree.insert(&item(5, 51)).unwrap();
        assert_eq!(tree.item_count(), 2);
        assert_eq!(tree.find(&IndexKey::from(Value::Int64(5))).unwrap().len(), 2);
    }

    #[test]
    fn removal_by_key_and_pair() {
        let dir = tempdir().unwrap();
        let tree = DiskBTree::open(dir.path().join("t.obt"), 512, extractor()).unwrap();
        for i in 1..=100i64 {
            tree.insert(&item(i, i as u64)).unwrap();
        }
        for i in (2..=100i64).step_by(2) {
            tree.remove_key(&IndexKey::from(Value::Int64(i))).unwrap();
        }
        assert!(tree.find(&IndexKey::from(Value::Int64(2))).unwrap().is_empty());
        assert_eq!(tree.scan_gt(&IndexKey::from(Value::Int64(90))).unwrap().len(), 5);

        assert!(tree.remove(&IndexKey::from(Value::Int64(1)), 1).unwrap());
        assert!(!tree.remove(&IndexKey::from(Value::Int64(1)), 1).unwrap());
    }

    #[test]
    fn persistence_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.obt");
        {
            let tree = DiskBTree::open(&path, 512, extractor()).unwrap();
            for i in 1..=100i64 {
                tree.insert(&item(i, i as u64)).unwrap();
            }
            tree.flush().unwrap();
        }
        {
            let tree = DiskBTree::open(&path, 512, extractor()).unwrap();
            assert_eq!(tree.item_count(), 100);
            let found = tree.find(&IndexKey::from(Value::Int64(50))).unwrap();
            assert_eq!(found.len(), 1);
            assert_eq!(row_of(&found[0]), 50);
            assert_eq!(
                tree.scan_lt(&IndexKey::from(Value::Int64(10))).unwrap().len(),
                9
            );
        }
    }

    #[test]
    fn many_items_force_deep_tree() {
        let dir = tempdir().unwrap();
        let tree = DiskBTree::open(dir.path().join("t.obt"), 256, extractor()).unwrap();
        // shuffled insert order
        let mut values: Vec<i64> = (0..2000).collect();
        use rand::seq::SliceRandom;
        values.shuffle(&mut rand::rng());
        for &v in &values {
            tree.insert(&item(v, v as u64)).unwrap();
        }
        assert_eq!(tree.item_count(), 2000);
        let all = tree.scan_all().unwrap();
        assert_eq!(all.len(), 2000);
        // leaf chain yields sorted order
        let rows: Vec<u64> = all.iter().map(|i| row_of(i)).collect();
        let mut sorted = rows.clone();
        sorted.sort_unstable();
        assert_eq!(rows, sorted);
    }

    #[test]
    fn scan_all_after_flush_and_reopen_deep() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deep.obt");
        {
            let tree = DiskBTree::open(&path, 256, extractor()).unwrap();
            for i in 0..1000i64 {
                tree.insert(&item(i, i as u64)).unwrap();
            }
            tree.flush().unwrap();
        }
        let tree = DiskBTree::open(&path, 256, extractor()).unwrap();
        assert_eq!(tree.scan_all().unwrap().len(), 1000);
    }
}
