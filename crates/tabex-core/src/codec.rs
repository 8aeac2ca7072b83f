/// Binary primitives shared by the settings file and the size-cache snapshot.
///
/// All fixed-width values are little-endian. Strings carry a 7-bit
/// variable-length prefix (low group first, high bit = "more follows")
/// followed by UTF-8 bytes. Instants and durations are stored as
/// 100-nanosecond ticks; instants count from 0001-01-01T00:00:00.
use crate::error::{StoreError, StoreResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use std::io::{Read, Write};

pub const TICKS_PER_SECOND: i64 = 10_000_000;
/// Ticks of 9999-12-31T23:59:59.9999999, the last representable instant.
pub const MAX_INSTANT_TICKS: i64 = 3_155_378_975_999_999_999;
const NANOS_PER_TICK: i64 = 100;

/// A length prefix never needs more than five 7-bit groups for a `u32`.
const MAX_VARINT_GROUPS: u32 = 5;

/// Write `len` as a 7-bit variable-length integer.
pub fn write_varint<W: Write>(wr: &mut W, len: u32) -> StoreResult<()> {
    let mut rest = len;
    while rest >= 0x80 {
        wr.write_u8((rest as u8) | 0x80)?;
        rest >>= 7;
    }
    wr.write_u8(rest as u8)?;
    Ok(())
}

/// Read a 7-bit variable-length integer written by [`write_varint`].
pub fn read_varint<R: Read>(rd: &mut R) -> StoreResult<u32> {
    let mut value: u32 = 0;
    for group in 0..MAX_VARINT_GROUPS {
        let byte = rd.read_u8()?;
        let bits = u32::from(byte & 0x7f);
        // The fifth group may only carry the top four bits of a u32.
        if group == MAX_VARINT_GROUPS - 1 && bits > 0x0f {
            return Err(StoreError::VarintTooLong);
        }
        value |= bits << (7 * group);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(StoreError::VarintTooLong)
}

pub fn write_string<W: Write>(wr: &mut W, s: &str) -> StoreResult<()> {
    let len = u32::try_from(s.len()).map_err(|_| StoreError::ValueOutOfRange {
        kind: "string length",
        value: s.len() as i128,
    })?;
    write_varint(wr, len)?;
    wr.write_all(s.as_bytes())?;
    Ok(())
}

pub fn read_string<R: Read>(rd: &mut R) -> StoreResult<String> {
    let len = read_varint(rd)? as usize;
    let bytes = read_exact_vec(rd, len)?;
    Ok(String::from_utf8(bytes)?)
}

/// `i32` length followed by the raw bytes.
pub fn write_bytes<W: Write>(wr: &mut W, bytes: &[u8]) -> StoreResult<()> {
    let len = i32::try_from(bytes.len()).map_err(|_| StoreError::ValueOutOfRange {
        kind: "byte sequence length",
        value: bytes.len() as i128,
    })?;
    wr.write_i32::<LittleEndian>(len)?;
    wr.write_all(bytes)?;
    Ok(())
}

pub fn read_bytes<R: Read>(rd: &mut R) -> StoreResult<Vec<u8>> {
    let len = rd.read_i32::<LittleEndian>()?;
    if len < 0 {
        return Err(StoreError::NegativeLength(len));
    }
    read_exact_vec(rd, len as usize)
}

/// Read exactly `len` bytes without trusting `len` for the allocation.
///
/// A corrupt prefix can claim gigabytes; reading through `take` grows the
/// buffer only as far as the input actually goes.
fn read_exact_vec<R: Read>(rd: &mut R, len: usize) -> StoreResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(len.min(64 * 1024));
    let read = rd.take(len as u64).read_to_end(&mut buf)?;
    if read != len {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
    }
    Ok(buf)
}

/// Leading entry count of both file formats.
pub fn read_count<R: Read>(rd: &mut R) -> StoreResult<usize> {
    let count = rd.read_i32::<LittleEndian>()?;
    if count < 0 {
        return Err(StoreError::NegativeCount(count));
    }
    Ok(count as usize)
}

pub fn write_count<W: Write>(wr: &mut W, count: usize) -> StoreResult<()> {
    let count = i32::try_from(count).map_err(|_| StoreError::ValueOutOfRange {
        kind: "entry count",
        value: count as i128,
    })?;
    wr.write_i32::<LittleEndian>(count)?;
    Ok(())
}

// ── Ticks ────────────────────────────────────────────────────────────────────

fn tick_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MIN)
}

/// Signed duration to ticks. Sub-tick precision is truncated.
pub fn duration_to_ticks(delta: TimeDelta) -> StoreResult<i64> {
    let secs = delta.num_seconds();
    let sub = i64::from(delta.subsec_nanos()) / NANOS_PER_TICK;
    secs.checked_mul(TICKS_PER_SECOND)
        .and_then(|t| t.checked_add(sub))
        .ok_or(StoreError::ValueOutOfRange {
            kind: "duration",
            value: i128::from(secs),
        })
}

pub fn ticks_to_duration(ticks: i64) -> StoreResult<TimeDelta> {
    let secs = ticks.div_euclid(TICKS_PER_SECOND);
    let nanos = ticks.rem_euclid(TICKS_PER_SECOND) * NANOS_PER_TICK;
    TimeDelta::try_seconds(secs)
        .and_then(|d| d.checked_add(&TimeDelta::nanoseconds(nanos)))
        .ok_or(StoreError::TicksOutOfRange(ticks))
}

/// Wall-clock reading (no zone) to ticks since the tick epoch. Instants
/// outside years 1 through 9999 are rejected.
pub fn naive_to_ticks(naive: NaiveDateTime) -> StoreResult<i64> {
    let since_epoch = naive.signed_duration_since(tick_epoch());
    let ticks = duration_to_ticks(since_epoch).map_err(|_| StoreError::ValueOutOfRange {
        kind: "timestamp",
        value: i128::from(since_epoch.num_seconds()),
    })?;
    if !(0..=MAX_INSTANT_TICKS).contains(&ticks) {
        return Err(StoreError::ValueOutOfRange {
            kind: "timestamp",
            value: i128::from(ticks),
        });
    }
    Ok(ticks)
}

pub fn ticks_to_naive(ticks: i64) -> StoreResult<NaiveDateTime> {
    if !(0..=MAX_INSTANT_TICKS).contains(&ticks) {
        return Err(StoreError::TicksOutOfRange(ticks));
    }
    ticks_to_duration(ticks)
        .ok()
        .and_then(|delta| tick_epoch().checked_add_signed(delta))
        .ok_or(StoreError::TicksOutOfRange(ticks))
}

pub fn datetime_to_ticks(instant: DateTime<Utc>) -> StoreResult<i64> {
    naive_to_ticks(instant.naive_utc())
}

pub fn ticks_to_datetime(ticks: i64) -> StoreResult<DateTime<Utc>> {
    ticks_to_naive(ticks).map(|naive| naive.and_utc())
}
