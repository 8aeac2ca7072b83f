/// The closed set of value kinds the settings store can hold.
///
/// Every value is written as `type_tag:string payload`. The tag set is
/// fixed; a type outside it cannot be stored because [`SettingType`] is
/// only implemented for the kinds listed here.
use crate::codec::{self, TICKS_PER_SECOND};
use crate::error::{StoreError, StoreResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, FixedOffset, TimeDelta, TimeZone, Utc};
use half::f16;
use rust_decimal::Decimal;
use std::io::{Read, Write};
use uuid::Uuid;

/// Discriminant of a [`SettingValue`], with its on-disk tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    U8,
    I8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    ISize,
    USize,
    F16,
    F32,
    F64,
    Decimal,
    String,
    DateTime,
    DateTimeOffset,
    Duration,
    Uuid,
    Bytes,
}

impl ValueKind {
    pub const ALL: [ValueKind; 22] = [
        Self::Null,
        Self::Bool,
        Self::U8,
        Self::I8,
        Self::I16,
        Self::U16,
        Self::I32,
        Self::U32,
        Self::I64,
        Self::U64,
        Self::ISize,
        Self::USize,
        Self::F16,
        Self::F32,
        Self::F64,
        Self::Decimal,
        Self::String,
        Self::DateTime,
        Self::DateTimeOffset,
        Self::Duration,
        Self::Uuid,
        Self::Bytes,
    ];

    /// Canonical tag written before each payload.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::U8 => "u8",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::I64 => "i64",
            Self::U64 => "u64",
            Self::ISize => "isize",
            Self::USize => "usize",
            Self::F16 => "f16",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Decimal => "decimal",
            Self::String => "string",
            Self::DateTime => "datetime",
            Self::DateTimeOffset => "datetime_offset",
            Self::Duration => "duration",
            Self::Uuid => "uuid",
            Self::Bytes => "bytes",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }
}

/// A dynamically-typed settings value.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    /// Explicit "no value" marker.
    Null,
    Bool(bool),
    U8(u8),
    I8(i8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    ISize(isize),
    USize(usize),
    F16(f16),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    String(String),
    DateTime(DateTime<Utc>),
    DateTimeOffset(DateTime<FixedOffset>),
    Duration(TimeDelta),
    Uuid(Uuid),
    Bytes(Vec<u8>),
}

impl SettingValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::U8(_) => ValueKind::U8,
            Self::I8(_) => ValueKind::I8,
            Self::I16(_) => ValueKind::I16,
            Self::U16(_) => ValueKind::U16,
            Self::I32(_) => ValueKind::I32,
            Self::U32(_) => ValueKind::U32,
            Self::I64(_) => ValueKind::I64,
            Self::U64(_) => ValueKind::U64,
            Self::ISize(_) => ValueKind::ISize,
            Self::USize(_) => ValueKind::USize,
            Self::F16(_) => ValueKind::F16,
            Self::F32(_) => ValueKind::F32,
            Self::F64(_) => ValueKind::F64,
            Self::Decimal(_) => ValueKind::Decimal,
            Self::String(_) => ValueKind::String,
            Self::DateTime(_) => ValueKind::DateTime,
            Self::DateTimeOffset(_) => ValueKind::DateTimeOffset,
            Self::Duration(_) => ValueKind::Duration,
            Self::Uuid(_) => ValueKind::Uuid,
            Self::Bytes(_) => ValueKind::Bytes,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Check that the value can be written. Strings and byte sequences
    /// must fit their length prefixes, instants must fall in years 1
    /// through 9999 and durations must fit 64-bit ticks.
    pub fn validate(&self) -> StoreResult<()> {
        match self {
            Self::String(v) => {
                u32::try_from(v.len()).map_err(|_| StoreError::ValueOutOfRange {
                    kind: "string length",
                    value: v.len() as i128,
                })?;
            }
            Self::Bytes(v) => {
                i32::try_from(v.len()).map_err(|_| StoreError::ValueOutOfRange {
                    kind: "byte sequence length",
                    value: v.len() as i128,
                })?;
            }
            Self::DateTime(v) => {
                codec::datetime_to_ticks(*v)?;
            }
            Self::DateTimeOffset(v) => {
                codec::naive_to_ticks(v.naive_local())?;
            }
            Self::Duration(v) => {
                codec::duration_to_ticks(*v)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Write `type_tag payload`.
    pub fn encode<W: Write>(&self, wr: &mut W) -> StoreResult<()> {
        codec::write_string(wr, self.kind().tag())?;
        match self {
            Self::Null => {}
            Self::Bool(v) => wr.write_u8(u8::from(*v))?,
            Self::U8(v) => wr.write_u8(*v)?,
            Self::I8(v) => wr.write_i8(*v)?,
            Self::I16(v) => wr.write_i16::<LittleEndian>(*v)?,
            Self::U16(v) => wr.write_u16::<LittleEndian>(*v)?,
            Self::I32(v) => wr.write_i32::<LittleEndian>(*v)?,
            Self::U32(v) => wr.write_u32::<LittleEndian>(*v)?,
            Self::I64(v) => wr.write_i64::<LittleEndian>(*v)?,
            Self::U64(v) => wr.write_u64::<LittleEndian>(*v)?,
            Self::ISize(v) => wr.write_i64::<LittleEndian>(*v as i64)?,
            Self::USize(v) => wr.write_u64::<LittleEndian>(*v as u64)?,
            Self::F16(v) => wr.write_u16::<LittleEndian>(v.to_bits())?,
            Self::F32(v) => wr.write_f32::<LittleEndian>(*v)?,
            Self::F64(v) => wr.write_f64::<LittleEndian>(*v)?,
            Self::Decimal(v) => wr.write_all(&v.serialize())?,
            Self::String(v) => codec::write_string(wr, v)?,
            Self::DateTime(v) => wr.write_i64::<LittleEndian>(codec::datetime_to_ticks(*v)?)?,
            Self::DateTimeOffset(v) => {
                // Local clock reading first, then the offset.
                wr.write_i64::<LittleEndian>(codec::naive_to_ticks(v.naive_local())?)?;
                let offset_ticks =
                    i64::from(v.offset().local_minus_utc()) * TICKS_PER_SECOND;
                wr.write_i64::<LittleEndian>(offset_ticks)?;
            }
            Self::Duration(v) => wr.write_i64::<LittleEndian>(codec::duration_to_ticks(*v)?)?,
            Self::Uuid(v) => wr.write_all(v.as_bytes())?,
            Self::Bytes(v) => codec::write_bytes(wr, v)?,
        }
        Ok(())
    }

    /// Read `type_tag payload`. An unknown tag aborts the read.
    pub fn decode<R: Read>(rd: &mut R) -> StoreResult<Self> {
        let tag = codec::read_string(rd)?;
        let kind = ValueKind::from_tag(&tag).ok_or(StoreError::UnknownTypeTag(tag))?;
        let value = match kind {
            ValueKind::Null => Self::Null,
            ValueKind::Bool => Self::Bool(rd.read_u8()? != 0),
            ValueKind::U8 => Self::U8(rd.read_u8()?),
            ValueKind::I8 => Self::I8(rd.read_i8()?),
            ValueKind::I16 => Self::I16(rd.read_i16::<LittleEndian>()?),
            ValueKind::U16 => Self::U16(rd.read_u16::<LittleEndian>()?),
            ValueKind::I32 => Self::I32(rd.read_i32::<LittleEndian>()?),
            ValueKind::U32 => Self::U32(rd.read_u32::<LittleEndian>()?),
            ValueKind::I64 => Self::I64(rd.read_i64::<LittleEndian>()?),
            ValueKind::U64 => Self::U64(rd.read_u64::<LittleEndian>()?),
            ValueKind::ISize => {
                let raw = rd.read_i64::<LittleEndian>()?;
                Self::ISize(isize::try_from(raw).map_err(|_| StoreError::ValueOutOfRange {
                    kind: "isize",
                    value: i128::from(raw),
                })?)
            }
            ValueKind::USize => {
                let raw = rd.read_u64::<LittleEndian>()?;
                Self::USize(usize::try_from(raw).map_err(|_| StoreError::ValueOutOfRange {
                    kind: "usize",
                    value: i128::from(raw),
                })?)
            }
            ValueKind::F16 => Self::F16(f16::from_bits(rd.read_u16::<LittleEndian>()?)),
            ValueKind::F32 => Self::F32(rd.read_f32::<LittleEndian>()?),
            ValueKind::F64 => Self::F64(rd.read_f64::<LittleEndian>()?),
            ValueKind::Decimal => {
                let mut raw = [0u8; 16];
                rd.read_exact(&mut raw)?;
                Self::Decimal(Decimal::deserialize(raw))
            }
            ValueKind::String => Self::String(codec::read_string(rd)?),
            ValueKind::DateTime => {
                Self::DateTime(codec::ticks_to_datetime(rd.read_i64::<LittleEndian>()?)?)
            }
            ValueKind::DateTimeOffset => {
                let local_ticks = rd.read_i64::<LittleEndian>()?;
                let offset_ticks = rd.read_i64::<LittleEndian>()?;
                Self::DateTimeOffset(offset_datetime(local_ticks, offset_ticks)?)
            }
            ValueKind::Duration => {
                Self::Duration(codec::ticks_to_duration(rd.read_i64::<LittleEndian>()?)?)
            }
            ValueKind::Uuid => {
                let mut raw = [0u8; 16];
                rd.read_exact(&mut raw)?;
                Self::Uuid(Uuid::from_bytes(raw))
            }
            ValueKind::Bytes => Self::Bytes(codec::read_bytes(rd)?),
        };
        Ok(value)
    }
}

fn offset_datetime(local_ticks: i64, offset_ticks: i64) -> StoreResult<DateTime<FixedOffset>> {
    let local = codec::ticks_to_naive(local_ticks)?;
    let offset = i32::try_from(offset_ticks / TICKS_PER_SECOND)
        .ok()
        .and_then(FixedOffset::east_opt)
        .ok_or(StoreError::TicksOutOfRange(offset_ticks))?;
    offset
        .from_local_datetime(&local)
        .single()
        .ok_or(StoreError::TicksOutOfRange(local_ticks))
}

/// A Rust type that maps onto exactly one [`ValueKind`].
///
/// `from_value` only matches its own kind: an `i32` stored under a key is
/// not returned to a caller asking for an `i64`.
pub trait SettingType: Sized {
    const KIND: ValueKind;

    fn into_value(self) -> SettingValue;

    fn from_value(value: &SettingValue) -> Option<Self>;
}

macro_rules! setting_type {
    ($ty:ty, $variant:ident) => {
        impl SettingType for $ty {
            const KIND: ValueKind = ValueKind::$variant;

            fn into_value(self) -> SettingValue {
                SettingValue::$variant(self)
            }

            fn from_value(value: &SettingValue) -> Option<Self> {
                match value {
                    SettingValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }

        impl From<$ty> for SettingValue {
            fn from(value: $ty) -> Self {
                SettingValue::$variant(value)
            }
        }
    };
}

setting_type!(bool, Bool);
setting_type!(u8, U8);
setting_type!(i8, I8);
setting_type!(i16, I16);
setting_type!(u16, U16);
setting_type!(i32, I32);
setting_type!(u32, U32);
setting_type!(i64, I64);
setting_type!(u64, U64);
setting_type!(isize, ISize);
setting_type!(usize, USize);
setting_type!(f16, F16);
setting_type!(f32, F32);
setting_type!(f64, F64);
setting_type!(Decimal, Decimal);
setting_type!(String, String);
setting_type!(DateTime<Utc>, DateTime);
setting_type!(DateTime<FixedOffset>, DateTimeOffset);
setting_type!(TimeDelta, Duration);
setting_type!(Uuid, Uuid);
setting_type!(Vec<u8>, Bytes);
