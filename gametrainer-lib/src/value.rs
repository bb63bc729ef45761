use std::{fmt, str::FromStr};

use serde::Deserialize;

use crate::{error::ProfileError, error::TransferError, memory_accessors::MemoryAccessor};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    U8,
    U16,
    U32,
    U64,
    I32,
    I64,
    F32,
    F64,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::U8 => "u8",
            ValueKind::U16 => "u16",
            ValueKind::U32 => "u32",
            ValueKind::U64 => "u64",
            ValueKind::I32 => "i32",
            ValueKind::I64 => "i64",
            ValueKind::F32 => "f32",
            ValueKind::F64 => "f64",
        }
    }

    pub fn size(self) -> usize {
        match self {
            ValueKind::U8 => 1,
            ValueKind::U16 => 2,
            ValueKind::U32 | ValueKind::I32 | ValueKind::F32 => 4,
            ValueKind::U64 | ValueKind::I64 | ValueKind::F64 => 8,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ValueKind {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            ValueKind::U8,
            ValueKind::U16,
            ValueKind::U32,
            ValueKind::U64,
            ValueKind::I32,
            ValueKind::I64,
            ValueKind::F32,
            ValueKind::F64,
        ]
        .into_iter()
        .find(|kind| kind.name() == s)
        .ok_or_else(|| ProfileError::InvalidValue {
            kind: "kind",
            text: s.to_owned(),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

fn parse_unsigned(text: &str) -> Option<u64> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

impl Value {
    /// Parses `text` as `kind`. Unsigned kinds also accept `0x` hex.
    pub fn parse(kind: ValueKind, text: &str) -> Result<Value, ProfileError> {
        let text = text.trim();
        let value = match kind {
            ValueKind::U8 => parse_unsigned(text).and_then(|v| v.try_into().ok()).map(Value::U8),
            ValueKind::U16 => parse_unsigned(text).and_then(|v| v.try_into().ok()).map(Value::U16),
            ValueKind::U32 => parse_unsigned(text).and_then(|v| v.try_into().ok()).map(Value::U32),
            ValueKind::U64 => parse_unsigned(text).map(Value::U64),
            ValueKind::I32 => text.parse().ok().map(Value::I32),
            ValueKind::I64 => text.parse().ok().map(Value::I64),
            ValueKind::F32 => text.parse().ok().map(Value::F32),
            ValueKind::F64 => text.parse().ok().map(Value::F64),
        };
        value.ok_or_else(|| ProfileError::InvalidValue {
            kind: kind.name(),
            text: text.to_owned(),
        })
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::U8(_) => ValueKind::U8,
            Value::U16(_) => ValueKind::U16,
            Value::U32(_) => ValueKind::U32,
            Value::U64(_) => ValueKind::U64,
            Value::I32(_) => ValueKind::I32,
            Value::I64(_) => ValueKind::I64,
            Value::F32(_) => ValueKind::F32,
            Value::F64(_) => ValueKind::F64,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::U8(v) => write!(f, "{}", v),
            Value::U16(v) => write!(f, "{}", v),
            Value::U32(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::F32(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
        }
    }
}

pub fn read_value(
    accessor: &impl MemoryAccessor,
    address: usize,
    kind: ValueKind,
) -> Result<Value, TransferError> {
    Ok(match kind {
        ValueKind::U8 => Value::U8(accessor.read_u8(address)?),
        ValueKind::U16 => Value::U16(accessor.read_u16(address)?),
        ValueKind::U32 => Value::U32(accessor.read_u32(address)?),
        ValueKind::U64 => Value::U64(accessor.read_u64(address)?),
        ValueKind::I32 => Value::I32(accessor.read_i32(address)?),
        ValueKind::I64 => Value::I64(accessor.read_i64(address)?),
        ValueKind::F32 => Value::F32(accessor.read_f32(address)?),
        ValueKind::F64 => Value::F64(accessor.read_f64(address)?),
    })
}

pub fn write_value(
    accessor: &impl MemoryAccessor,
    address: usize,
    value: Value,
) -> Result<(), TransferError> {
    match value {
        Value::U8(v) => accessor.write_u8(address, v),
        Value::U16(v) => accessor.write_u16(address, v),
        Value::U32(v) => accessor.write_u32(address, v),
        Value::U64(v) => accessor.write_u64(address, v),
        Value::I32(v) => accessor.write_i32(address, v),
        Value::I64(v) => accessor.write_i64(address, v),
        Value::F32(v) => accessor.write_f32(address, v),
        Value::F64(v) => accessor.write_f64(address, v),
    }
}
