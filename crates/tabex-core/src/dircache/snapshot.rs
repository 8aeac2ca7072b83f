/// On-disk snapshot of the size cache.
///
/// ```text
/// file   := count:i32 record*
/// record := key:i32 size:i64 computed_at_ticks:i64
/// ```
use super::key::DirectoryKey;
use crate::codec;
use crate::error::{StoreError, StoreResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};
use std::io::{BufRead, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub key: DirectoryKey,
    pub size: u64,
    pub computed_at: DateTime<Utc>,
}

/// Write `records`; the leading count always equals `records.len()`.
pub fn write_snapshot<W: Write>(wr: &mut W, records: &[SnapshotRecord]) -> StoreResult<()> {
    codec::write_count(wr, records.len())?;
    for record in records {
        let size = i64::try_from(record.size).map_err(|_| StoreError::ValueOutOfRange {
            kind: "directory size",
            value: i128::from(record.size),
        })?;
        wr.write_i32::<LittleEndian>(record.key.to_raw())?;
        wr.write_i64::<LittleEndian>(size)?;
        wr.write_i64::<LittleEndian>(codec::datetime_to_ticks(record.computed_at)?)?;
    }
    Ok(())
}

/// Read a whole snapshot. Empty input is an empty snapshot.
pub fn read_snapshot<R: BufRead>(rd: &mut R) -> StoreResult<Vec<SnapshotRecord>> {
    if rd.fill_buf()?.is_empty() {
        return Ok(Vec::new());
    }

    let count = codec::read_count(rd)?;
    let mut records = Vec::with_capacity(count.min(65_536));
    for _ in 0..count {
        let key = DirectoryKey::from_raw(rd.read_i32::<LittleEndian>()?);
        let raw_size = rd.read_i64::<LittleEndian>()?;
        let size = u64::try_from(raw_size).map_err(|_| StoreError::ValueOutOfRange {
            kind: "directory size",
            value: i128::from(raw_size),
        })?;
        let computed_at = codec::ticks_to_datetime(rd.read_i64::<LittleEndian>()?)?;
        records.push(SnapshotRecord {
            key,
            size,
            computed_at,
        });
    }
    Ok(records)
}
