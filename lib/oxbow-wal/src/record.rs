//! WAL record framing and payload encoding.
//!
//! Every record is framed as `[length u32 BE][payload][crc32 u32 BE]`
//! where the CRC covers the payload bytes. The payload is a self-describing
//! msgpack array beginning with the previous record's CRC, this record's
//! WAL id, and the transaction id:
//!
//! * commit marker: `[prev_crc, id, txn]`
//! * physical insert: `[prev_crc, id, txn, 4, db, table, chunk, row_start, row_count]`
//! * physical delete: `[prev_crc, id, txn, 5, db, table, [row_ids...], row_count]`
//! * physical update: `[prev_crc, id, txn, 6, db, table, [row_ids...], chunk, row_count]`
//!
//! Anything else is a legacy logical record and is skipped on replay.

use byteorder::{BigEndian, ByteOrder};

use oxbow_types::DataChunk;

use crate::error::{Result, WalError};

pub const KIND_PHYSICAL_INSERT: u64 = 4;
pub const KIND_PHYSICAL_DELETE: u64 = 5;
pub const KIND_PHYSICAL_UPDATE: u64 = 6;

/// Frame overhead: 4-byte length prefix plus 4-byte CRC suffix.
pub const FRAME_OVERHEAD: usize = 8;

/// The operation a WAL record describes.
#[derive(Debug, Clone, PartialEq)]
pub enum WalEntry {
    PhysicalInsert {
        database: String,
        table: String,
        chunk: DataChunk,
        row_start: u64,
        row_count: u64,
    },
    PhysicalDelete {
        database: String,
        table: String,
        row_ids: Vec<u64>,
        row_count: u64,
    },
    PhysicalUpdate {
        database: String,
        table: String,
        row_ids: Vec<u64>,
        chunk: DataChunk,
        row_count: u64,
    },
    Commit,
    /// Legacy logical record: parsed past, never replayed.
    Data,
}

impl WalEntry {
    pub fn is_commit_marker(&self) -> bool {
        matches!(self, WalEntry::Commit)
    }

    pub fn is_physical(&self) -> bool {
        matches!(
            self,
            WalEntry::PhysicalInsert { .. }
                | WalEntry::PhysicalDelete { .. }
                | WalEntry::PhysicalUpdate { .. }
        )
    }
}

/// One decoded WAL record.
#[derive(Debug, Clone, PartialEq)]
pub struct WalRecord {
    pub wal_id: u64,
    pub transaction_id: u64,
    pub prev_crc: u32,
    pub crc: u32,
    pub entry: WalEntry,
}

type CommitWire = (u32, u64, u64);
type InsertWire = (u32, u64, u64, u64, String, String, DataChunk, u64, u64);
type DeleteWire = (u32, u64, u64, u64, String, String, Vec<u64>, u64);
type UpdateWire = (u32, u64, u64, u64, String, String, Vec<u64>, DataChunk, u64);

/// Serialize a payload (without framing) for the given record.
pub fn encode_payload(
    prev_crc: u32,
    wal_id: u64,
    transaction_id: u64,
    entry: &WalEntry,
) -> Result<Vec<u8>> {
    let bytes = match entry {
        WalEntry::Commit => rmp_serde::to_vec(&(prev_crc, wal_id, transaction_id)),
        WalEntry::PhysicalInsert {
            database,
            table,
            chunk,
            row_start,
            row_count,
        } => rmp_serde::to_vec(&(
            prev_crc,
            wal_id,
            transaction_id,
            KIND_PHYSICAL_INSERT,
            database,
            table,
            chunk,
            row_start,
            row_count,
        )),
        WalEntry::PhysicalDelete {
            database,
            table,
            row_ids,
            row_count,
        } => rmp_serde::to_vec(&(
            prev_crc,
            wal_id,
            transaction_id,
            KIND_PHYSICAL_DELETE,
            database,
            table,
            row_ids,
            row_count,
        )),
        WalEntry::PhysicalUpdate {
            database,
            table,
            row_ids,
            chunk,
            row_count,
        } => rmp_serde::to_vec(&(
            prev_crc,
            wal_id,
            transaction_id,
            KIND_PHYSICAL_UPDATE,
            database,
            table,
            row_ids,
            chunk,
            row_count,
        )),
        WalEntry::Data => {
            return Err(WalError::InvalidRecord {
                reason: "legacy DATA records are never written".into(),
            })
        }
    };
    bytes.map_err(|e| WalError::Serialize {
        detail: e.to_string(),
    })
}

/// Frame a payload: big-endian length, payload bytes, big-endian CRC32.
pub fn frame_payload(payload: &[u8]) -> (Vec<u8>, u32) {
    let crc = crc32fast::hash(payload);
    let mut frame = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
    let mut buf = [0u8; 4];
    BigEndian::write_u32(&mut buf, payload.len() as u32);
    frame.extend_from_slice(&buf);
    frame.extend_from_slice(payload);
    BigEndian::write_u32(&mut buf, crc);
    frame.extend_from_slice(&buf);
    (frame, crc)
}

/// Decode one payload whose CRC already checked out.
pub fn decode_payload(payload: &[u8], crc: u32) -> Result<WalRecord> {
    // shape peek: array length, then the three header integers
    let mut cursor = payload;
    let array_len =
        rmp::decode::read_array_len(&mut cursor).map_err(|e| WalError::Deserialize {
            detail: format!("payload is not a msgpack array: {e}"),
        })?;

    if array_len == 3 {
        let (prev_crc, wal_id, transaction_id): CommitWire =
            rmp_serde::from_slice(payload).map_err(|e| WalError::Deserialize {
                detail: format!("bad commit marker: {e}"),
            })?;
        return Ok(WalRecord {
            wal_id,
            transaction_id,
            prev_crc,
            crc,
            entry: WalEntry::Commit,
        });
    }

    if array_len < 8 {
        // legacy logical record
        return legacy_record(payload, crc);
    }

    let _prev: u32 = read_uint(&mut cursor)?;
    let _id: u64 = read_uint(&mut cursor)?;
    let _txn: u64 = read_uint(&mut cursor)?;
    let kind: u64 = match read_uint(&mut cursor) {
        Ok(kind) => kind,
        Err(_) => return legacy_record(payload, crc),
    };

    match (kind, array_len) {
        (KIND_PHYSICAL_INSERT, 9) => {
            let wire: InsertWire =
                rmp_serde::from_slice(payload).map_err(|e| WalError::Deserialize {
                    detail: format!("bad physical insert: {e}"),
                })?;
            Ok(WalRecord {
                prev_crc: wire.0,
                wal_id: wire.1,
                transaction_id: wire.2,
                crc,
                entry: WalEntry::PhysicalInsert {
                    database: wire.4,
                    table: wire.5,
                    chunk: wire.6,
                    row_start: wire.7,
                    row_count: wire.8,
                },
            })
        }
        (KIND_PHYSICAL_DELETE, 8) => {
            let wire: DeleteWire =
                rmp_serde::from_slice(payload).map_err(|e| WalError::Deserialize {
                    detail: format!("bad physical delete: {e}"),
                })?;
            Ok(WalRecord {
                prev_crc: wire.0,
                wal_id: wire.1,
                transaction_id: wire.2,
                crc,
                entry: WalEntry::PhysicalDelete {
                    database: wire.4,
                    table: wire.5,
                    row_ids: wire.6,
                    row_count: wire.7,
                },
            })
        }
        (KIND_PHYSICAL_UPDATE, 9) => {
            let wire: UpdateWire =
                rmp_serde::from_slice(payload).map_err(|e| WalError::Deserialize {
                    detail: format!("bad physical update: {e}"),
                })?;
            Ok(WalRecord {
                prev_crc: wire.0,
                wal_id: wire.1,
                transaction_id: wire.2,
                crc,
                entry: WalEntry::PhysicalUpdate {
                    database: wire.4,
                    table: wire.5,
                    row_ids: wire.6,
                    chunk: wire.7,
                    row_count: wire.8,
                },
            })
        }
        _ => legacy_record(payload, crc),
    }
}

/// Legacy records keep the log chain intact but carry no replayable data.
fn legacy_record(payload: &[u8], crc: u32) -> Result<WalRecord> {
    let mut cursor = payload;
    rmp::decode::read_array_len(&mut cursor).map_err(|e| WalError::Deserialize {
        detail: format!("payload is not a msgpack array: {e}"),
    })?;
    let prev_crc: u32 = read_uint(&mut cursor)?;
    let wal_id: u64 = read_uint(&mut cursor)?;
    Ok(WalRecord {
        wal_id,
        transaction_id: 0,
        prev_crc,
        crc,
        entry: WalEntry::Data,
    })
}

fn read_uint<T: TryFrom<u64>>(cursor: &mut &[u8]) -> Result<T> {
    let value: u64 = rmp::decode::read_int(cursor).map_err(|e| WalError::Deserialize {
        detail: format!("expected unsigned integer: {e}"),
    })?;
    T::try_from(value).map_err(|_| WalError::Deserialize {
        detail: "integer out of range".into(),
    })
}
