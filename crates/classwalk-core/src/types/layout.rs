//! Byte order, pointer width, and scalar encodings.
//!
//! None of these are ever inferred from image contents. The caller picks the
//! byte order and pointer width of the target, and every scalar decode takes
//! them as explicit input.

use std::fmt;
use std::str::FromStr;

/// Byte order of the target that produced the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder
{
    /// Least significant byte first (x86-64, most AArch64 targets)
    Little,
    /// Most significant byte first (s390x, POWER in BE mode)
    Big,
}

impl FromStr for ByteOrder
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "little" | "le" | "little-endian" => Ok(ByteOrder::Little),
            "big" | "be" | "big-endian" => Ok(ByteOrder::Big),
            _ => Err(format!("Unknown byte order: {s}. Use 'little' or 'big'")),
        }
    }
}

impl fmt::Display for ByteOrder
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            ByteOrder::Little => write!(f, "little"),
            ByteOrder::Big => write!(f, "big"),
        }
    }
}

/// Pointer width of the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerWidth
{
    /// 4-byte pointers
    Bits32,
    /// 8-byte pointers
    Bits64,
}

impl PointerWidth
{
    /// Size of one pointer in bytes
    pub const fn bytes(self) -> usize
    {
        match self {
            PointerWidth::Bits32 => 4,
            PointerWidth::Bits64 => 8,
        }
    }
}

impl FromStr for PointerWidth
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.trim() {
            "32" | "4" => Ok(PointerWidth::Bits32),
            "64" | "8" => Ok(PointerWidth::Bits64),
            _ => Err(format!("Unknown pointer width: {s}. Use '32' or '64'")),
        }
    }
}

impl fmt::Display for PointerWidth
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.bytes() * 8)
    }
}

/// How the bytes of a scalar slot are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarEncoding
{
    Unsigned,
    Signed,
    Float,
}

/// Width and encoding of a scalar slot
///
/// ## Example
///
/// ```rust
/// use classwalk_core::types::{ByteOrder, ScalarType, ScalarValue};
///
/// let ty = ScalarType::unsigned(2);
/// assert_eq!(ty.decode(&[0x12, 0x34], ByteOrder::Big), Some(ScalarValue::Unsigned(0x1234)));
/// assert_eq!(ty.decode(&[0x12, 0x34], ByteOrder::Little), Some(ScalarValue::Unsigned(0x3412)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScalarType
{
    /// Width in bytes: 1, 2, 4, or 8
    pub width: u8,
    pub encoding: ScalarEncoding,
}

impl ScalarType
{
    pub const fn unsigned(width: u8) -> Self
    {
        Self {
            width,
            encoding: ScalarEncoding::Unsigned,
        }
    }

    pub const fn signed(width: u8) -> Self
    {
        Self {
            width,
            encoding: ScalarEncoding::Signed,
        }
    }

    pub const fn float(width: u8) -> Self
    {
        Self {
            width,
            encoding: ScalarEncoding::Float,
        }
    }

    /// Unsigned scalar as wide as a target pointer
    pub const fn pointer(width: PointerWidth) -> Self
    {
        Self::unsigned(width.bytes() as u8)
    }

    /// Whether this width/encoding pair can be decoded at all
    pub fn is_valid(self) -> bool
    {
        match self.encoding {
            ScalarEncoding::Float => matches!(self.width, 4 | 8),
            ScalarEncoding::Unsigned | ScalarEncoding::Signed => matches!(self.width, 1 | 2 | 4 | 8),
        }
    }

    /// Decode `bytes` with the given byte order
    ///
    /// Returns `None` if `bytes` is not exactly `width` long or the
    /// width/encoding pair is invalid.
    pub fn decode(self, bytes: &[u8], order: ByteOrder) -> Option<ScalarValue>
    {
        if !self.is_valid() || bytes.len() != usize::from(self.width) {
            return None;
        }

        let raw = read_uint(bytes, order);
        let value = match self.encoding {
            ScalarEncoding::Unsigned => ScalarValue::Unsigned(raw),
            ScalarEncoding::Signed => ScalarValue::Signed(sign_extend(raw, self.width)),
            ScalarEncoding::Float => {
                if self.width == 4 {
                    ScalarValue::Float(f64::from(f32::from_bits(raw as u32)))
                } else {
                    ScalarValue::Float(f64::from_bits(raw))
                }
            }
        };
        Some(value)
    }
}

/// Assemble up to 8 bytes into an unsigned integer
pub fn read_uint(bytes: &[u8], order: ByteOrder) -> u64
{
    let fold = |acc: u64, byte: &u8| (acc << 8) | u64::from(*byte);
    match order {
        ByteOrder::Big => bytes.iter().fold(0, fold),
        ByteOrder::Little => bytes.iter().rev().fold(0, fold),
    }
}

fn sign_extend(raw: u64, width: u8) -> i64
{
    let shift = 64 - u32::from(width) * 8;
    ((raw << shift) as i64) >> shift
}

/// A decoded scalar value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue
{
    Unsigned(u64),
    Signed(i64),
    Float(f64),
}

impl fmt::Display for ScalarValue
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            ScalarValue::Unsigned(v) => write!(f, "{v} (0x{v:x})"),
            ScalarValue::Signed(v) => write!(f, "{v}"),
            ScalarValue::Float(v) => write!(f, "{v}"),
        }
    }
}
