//! Two-pass committed-only WAL reader.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::record::{decode_payload, WalRecord, FRAME_OVERHEAD};

/// Reads every agent WAL file in a directory and replays the committed
/// prefix.
#[derive(Debug)]
pub struct WalReader {
    files: Vec<PathBuf>,
}

impl WalReader {
    /// Discover `.wal_<agent>` files (plus a legacy bare `.wal`) in `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let mut files = Vec::new();
        if let Ok(entries) = fs::read_dir(dir) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name.starts_with(".wal_") {
                    files.push(entry.path());
                }
            }
        }
        files.sort();
        if files.is_empty() {
            let legacy = dir.join(".wal");
            if legacy.exists() {
                debug!(path = %legacy.display(), "falling back to legacy WAL file");
                files.push(legacy);
            }
        }
        WalReader { files }
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Return every PHYSICAL record whose transaction has a COMMIT marker
    /// (or whose transaction id is 0), with id greater than `after_id`,
    /// sorted by WAL id.
    ///
    /// Pass 1 walks each file collecting records and the committed set;
    /// pass 2 filters. A length or CRC mismatch stops pass 1 at that offset
    /// in the offending file: the rest of that file is treated as lost.
    pub fn read_committed_records(&self, after_id: u64) -> Result<Vec<WalRecord>> {
        let mut all_records = Vec::new();
        let mut committed: HashSet<u64> = HashSet::new();

        for path in &self.files {
            let records = scan_file(path)?;
            for record in records {
                if record.entry.is_commit_marker() {
                    if record.transaction_id != 0 {
                        committed.insert(record.transaction_id);
                    }
                    continue;
                }
                if !record.entry.is_physical() {
                    continue;
                }
                if record.wal_id > after_id {
                    all_records.push(record);
                }
            }
        }

        let mut replayable: Vec<WalRecord> = all_records
            .into_iter()
            .filter(|r| r.transaction_id == 0 || committed.contains(&r.transaction_id))
            .collect();
        replayable.sort_by_key(|r| r.wal_id);
        debug!(
            records = replayable.len(),
            after_id, "collected committed WAL records"
        );
        Ok(replayable)
    }
}

/// Walk one WAL file, returning every intact record in file order.
///
/// Stops at the first truncated frame, CRC mismatch, or break in the
/// previous-CRC chain; records after the corruption are dropped.
pub(crate) fn scan_file(path: &Path) -> Result<Vec<WalRecord>> {
    let Ok(data) = fs::read(path) else {
        return Ok(Vec::new());
    };
    let mut records = Vec::new();
    let mut offset = 0usize;
    let mut last_crc = 0u32;

    while offset + 4 <= data.len() {
        let length = BigEndian::read_u32(&data[offset..offset + 4]) as usize;
        if length == 0 {
            break;
        }
        let end = offset + FRAME_OVERHEAD + length;
        if end > data.len() {
            warn!(path = %path.display(), offset, "truncated WAL frame; dropping tail");
            break;
        }
        let payload = &data[offset + 4..offset + 4 + length];
        let stored = BigEndian::read_u32(&data[offset + 4 + length..end]);
        let calculated = crc32fast::hash(payload);
        if stored != calculated {
            warn!(
                path = %path.display(),
                offset, stored, calculated, "WAL CRC mismatch; dropping tail"
            );
            break;
        }
        let record = match decode_payload(payload, calculated) {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %path.display(), offset, error = %e, "undecodable WAL record; dropping tail");
                break;
            }
        };
        // the previous-CRC chain proves the accepted records form an
        // uninterrupted prefix
        if !records.is_empty() && record.prev_crc != last_crc {
            warn!(
                path = %path.display(),
                offset, "WAL previous-CRC chain broken; dropping tail"
            );
            break;
        }
        trace!(wal_id = record.wal_id, offset, "read WAL record");
        last_crc = record.crc;
        records.push(record);
        offset = end;
    }
    Ok(records)
}
