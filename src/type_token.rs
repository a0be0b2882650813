//! Numeric type tags and value decoding.
//!
//! This module provides:
//! - [`TypeTag`]: the closed set of primitive numeric kinds a point field can
//!   carry. Every supported NumPy basic kind maps to exactly one tag.
//! - [`ByteOrder`]: the storage byte order of a field.
//! - [`Value`]: a decoded field value, used by the bundled point sinks.
//!
//! Tags are tiny `Copy` values; the schema, iterator and sinks pass them
//! around freely instead of carrying generic parameters.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A primitive numeric storage type.
///
/// ```
/// use npy_points::TypeTag;
///
/// let tag = TypeTag::from_kind('f', 8).unwrap();
/// assert_eq!(tag, TypeTag::F64);
/// assert_eq!(tag.size(), 8);
/// assert_eq!(TypeTag::from_kind('b', 1), None);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl TypeTag {
    /// Every supported tag, in declaration order.
    pub const ALL: [TypeTag; 10] = [
        TypeTag::I8,
        TypeTag::I16,
        TypeTag::I32,
        TypeTag::I64,
        TypeTag::U8,
        TypeTag::U16,
        TypeTag::U32,
        TypeTag::U64,
        TypeTag::F32,
        TypeTag::F64,
    ];

    /// Map a NumPy basic kind character and element size to a tag.
    ///
    /// Returns `None` for anything that is not a signed/unsigned integer of
    /// 1/2/4/8 bytes or a float of 4/8 bytes.
    pub fn from_kind(kind: char, size: usize) -> Option<Self> {
        match (kind, size) {
            ('i', 1) => Some(Self::I8),
            ('i', 2) => Some(Self::I16),
            ('i', 4) => Some(Self::I32),
            ('i', 8) => Some(Self::I64),
            ('u', 1) => Some(Self::U8),
            ('u', 2) => Some(Self::U16),
            ('u', 4) => Some(Self::U32),
            ('u', 8) => Some(Self::U64),
            ('f', 4) => Some(Self::F32),
            ('f', 8) => Some(Self::F64),
            _ => None,
        }
    }

    /// Element size in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    /// NumPy kind character (`i`, `u` or `f`).
    pub const fn kind(self) -> char {
        match self {
            Self::I8 | Self::I16 | Self::I32 | Self::I64 => 'i',
            Self::U8 | Self::U16 | Self::U32 | Self::U64 => 'u',
            Self::F32 | Self::F64 => 'f',
        }
    }

    /// Whether this is `F32` or `F64`.
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Whether this is a signed integer.
    pub const fn is_signed(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    /// Human-readable interpretation name, e.g. `"double"` or `"uint16_t"`.
    pub const fn name(self) -> &'static str {
        match self {
            Self::I8 => "int8_t",
            Self::I16 => "int16_t",
            Self::I32 => "int32_t",
            Self::I64 => "int64_t",
            Self::U8 => "uint8_t",
            Self::U16 => "uint16_t",
            Self::U32 => "uint32_t",
            Self::U64 => "uint64_t",
            Self::F32 => "float",
            Self::F64 => "double",
        }
    }

    /// The narrowest tag able to hold values of both `self` and `other`.
    ///
    /// Floats win over integers, and a float meeting an integer of 32 bits or
    /// more becomes `F64`. Mixed signedness promotes to a signed integer large
    /// enough for the unsigned side, capped at 64 bits.
    pub fn widen(self, other: TypeTag) -> TypeTag {
        if self == other {
            return self;
        }
        if self.is_float() || other.is_float() {
            let needs_double = [self, other]
                .iter()
                .any(|t| *t == Self::F64 || (!t.is_float() && t.size() >= 4));
            return if needs_double { Self::F64 } else { Self::F32 };
        }
        if self.is_signed() == other.is_signed() {
            let size = self.size().max(other.size());
            return Self::from_kind(self.kind(), size).unwrap_or(self);
        }
        let (signed, unsigned) = if self.is_signed() {
            (self, other)
        } else {
            (other, self)
        };
        let size = if unsigned.size() >= signed.size() {
            (unsigned.size() * 2).min(8)
        } else {
            signed.size()
        };
        Self::from_kind('i', size).unwrap_or(Self::I64)
    }

    /// Decode one native-endian element.
    ///
    /// Returns `None` when `bytes` is not exactly [`size`](Self::size) long.
    pub fn decode(self, bytes: &[u8]) -> Option<Value> {
        let value = match self {
            Self::I8 => Value::Signed(i8::from_ne_bytes(bytes.try_into().ok()?).into()),
            Self::I16 => Value::Signed(i16::from_ne_bytes(bytes.try_into().ok()?).into()),
            Self::I32 => Value::Signed(i32::from_ne_bytes(bytes.try_into().ok()?).into()),
            Self::I64 => Value::Signed(i64::from_ne_bytes(bytes.try_into().ok()?)),
            Self::U8 => Value::Unsigned(u8::from_ne_bytes(bytes.try_into().ok()?).into()),
            Self::U16 => Value::Unsigned(u16::from_ne_bytes(bytes.try_into().ok()?).into()),
            Self::U32 => Value::Unsigned(u32::from_ne_bytes(bytes.try_into().ok()?).into()),
            Self::U64 => Value::Unsigned(u64::from_ne_bytes(bytes.try_into().ok()?)),
            Self::F32 => Value::Float(f32::from_ne_bytes(bytes.try_into().ok()?).into()),
            Self::F64 => Value::Float(f64::from_ne_bytes(bytes.try_into().ok()?)),
        };
        Some(value)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Storage byte order of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ByteOrder {
    Little,
    Big,
    /// Single-byte types (`|` in a typestr).
    NotApplicable,
}

impl ByteOrder {
    /// Byte order of the running machine.
    pub const fn native() -> Self {
        if cfg!(target_endian = "little") {
            Self::Little
        } else {
            Self::Big
        }
    }

    /// Whether values stored in this order must be reversed before decoding.
    pub fn needs_swap(self) -> bool {
        self != Self::NotApplicable && self != Self::native()
    }
}

/// A decoded field value.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
}

impl Value {
    /// The value as `f64` (lossy for 64-bit integers beyond 2^53).
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Signed(v) => v as f64,
            Self::Unsigned(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    /// The value as `i64`, if it is an integer that fits.
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Self::Signed(v) => Some(v),
            Self::Unsigned(v) => i64::try_from(v).ok(),
            Self::Float(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tag_round_trips_through_kind_and_size() {
        for tag in TypeTag::ALL {
            assert_eq!(TypeTag::from_kind(tag.kind(), tag.size()), Some(tag));
        }
    }

    #[test]
    fn unsupported_kinds_have_no_tag() {
        assert_eq!(TypeTag::from_kind('f', 2), None);
        assert_eq!(TypeTag::from_kind('c', 16), None);
        assert_eq!(TypeTag::from_kind('b', 1), None);
        assert_eq!(TypeTag::from_kind('i', 3), None);
    }

    #[test]
    fn widen_prefers_floats_and_larger_integers() {
        assert_eq!(TypeTag::U8.widen(TypeTag::U16), TypeTag::U16);
        assert_eq!(TypeTag::I32.widen(TypeTag::F32), TypeTag::F64);
        assert_eq!(TypeTag::F32.widen(TypeTag::I16), TypeTag::F32);
        assert_eq!(TypeTag::F32.widen(TypeTag::F64), TypeTag::F64);
        assert_eq!(TypeTag::U16.widen(TypeTag::I16), TypeTag::I32);
        assert_eq!(TypeTag::U8.widen(TypeTag::I32), TypeTag::I32);
        assert_eq!(TypeTag::U64.widen(TypeTag::I8), TypeTag::I64);
    }

    #[test]
    fn decode_requires_exact_width() {
        assert_eq!(TypeTag::U16.decode(&7u16.to_ne_bytes()), Some(Value::Unsigned(7)));
        assert_eq!(TypeTag::U16.decode(&[1, 2, 3]), None);
        assert_eq!(TypeTag::F32.decode(&1.5f32.to_ne_bytes()), Some(Value::Float(1.5)));
    }
}
