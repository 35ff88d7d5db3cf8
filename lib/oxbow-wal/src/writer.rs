//! Per-agent WAL writer.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use snafu::ResultExt;
use tracing::{debug, trace};

use crate::error::{IoSnafu, Result};
use crate::reader::scan_file;
use crate::record::{encode_payload, frame_payload, WalEntry};

/// Name of the WAL file of one agent.
pub fn wal_file_name(agent: u32) -> String {
    format!(".wal_{agent}")
}

#[derive(Debug)]
struct WriterState {
    file: File,
    next_wal_id: u64,
    last_crc: u32,
}

/// Append-only writer over one agent's WAL file.
///
/// WAL ids are strictly increasing per file, and each record carries the
/// previous record's CRC so the reader can verify it accepted an
/// uninterrupted prefix. The framing mutex covers id assignment and the
/// write; fsync (when enabled) happens outside it.
#[derive(Debug)]
pub struct WalWriter {
    path: PathBuf,
    sync_to_disk: bool,
    state: Mutex<WriterState>,
}

impl WalWriter {
    /// Open (or create) the WAL file of `agent` inside `dir`, positioning
    /// after the last intact record.
    pub fn open(dir: impl AsRef<Path>, agent: u32, sync_to_disk: bool) -> Result<Self> {
        let path = dir.as_ref().join(wal_file_name(agent));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .context(IoSnafu {
                operation: "open WAL file",
            })?;

        // recover the id/crc chain from whatever intact prefix exists
        let existing = scan_file(&path).unwrap_or_default();
        let next_wal_id = existing.iter().map(|r| r.wal_id + 1).max().unwrap_or(1);
        let last_crc = existing.last().map(|r| r.crc).unwrap_or(0);
        debug!(
            path = %path.display(),
            next_wal_id,
            "opened WAL writer"
        );
        Ok(WalWriter {
            path,
            sync_to_disk,
            state: Mutex::new(WriterState {
                file,
                next_wal_id,
                last_crc,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The highest WAL id handed out so far; 0 when the log is empty.
    pub fn last_assigned_id(&self) -> u64 {
        self.state.lock().next_wal_id - 1
    }

    /// Append one record; returns the WAL id it was assigned.
    pub fn append(&self, transaction_id: u64, entry: &WalEntry) -> Result<u64> {
        let (wal_id, sync_handle) = {
            let mut state = self.state.lock();
            let wal_id = state.next_wal_id;
            let payload = encode_payload(state.last_crc, wal_id, transaction_id, entry)?;
            let (frame, crc) = frame_payload(&payload);
            state.file.write_all(&frame).context(IoSnafu {
                operation: "append WAL record",
            })?;
            state.next_wal_id += 1;
            state.last_crc = crc;
            let sync_handle = if self.sync_to_disk {
                Some(state.file.try_clone().context(IoSnafu {
                    operation: "clone WAL handle",
                })?)
            } else {
                None
            };
            (wal_id, sync_handle)
        };
        // durability point: fsync outside the framing mutex
        if let Some(file) = sync_handle {
            file.sync_data().context(IoSnafu {
                operation: "sync WAL record",
            })?;
        }
        trace!(wal_id, transaction_id, "appended WAL record");
        Ok(wal_id)
    }

    /// Append the commit marker finalizing `transaction_id`.
    pub fn append_commit(&self, transaction_id: u64) -> Result<u64> {
        self.append(transaction_id, &WalEntry::Commit)
    }

    pub fn flush(&self) -> Result<()> {
        self.state.lock().file.flush().context(IoSnafu {
            operation: "flush WAL file",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn wal_ids_are_strictly_increasing() {
        let dir = tempdir().unwrap();
        let writer = WalWriter::open(dir.path(), 0, false).unwrap();
        let a = writer.append_commit(1).unwrap();
        let b = writer.append_commit(2).unwrap();
        let c = writer.append_commit(3).unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn reopen_resumes_id_chain() {
        let dir = tempdir().unwrap();
        let last = {
            let writer = WalWriter::open(dir.path(), 0, true).unwrap();
            writer.append_commit(1).unwrap();
            writer.append_commit(2).unwrap()
        };
        let writer = WalWriter::open(dir.path(), 0, false).unwrap();
        let next = writer.append_commit(3).unwrap();
        assert_eq!(next, last + 1);
    }
}
