//! Element types that can travel between ranks.
//!
//! [`Datatype`] is a sealed trait mapping a Rust element type to a
//! [`DatatypeTag`]. Both the send and the receive declare their element type
//! through it. The local world carries the tag with every message, so a
//! receive declared with another type fails. Under MPI only the element size
//! is visible to the receive, so types of equal size, or a byte count that
//! happens to be a whole number of wider elements, are not told apart.
//!
//! | Rust Type      | MPI Equivalent | Tag Value |
//! |----------------|----------------|-----------|
//! | `u8`           | `MPI_UINT8_T`  | 0         |
//! | [`TransferUnit`] | `MPI_UINT8_T`  | 0         |
//! | `i32`          | `MPI_INT32_T`  | 1         |

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

mod sealed {
    pub trait Sealed {}
}

/// Tag values matching the C-side `RANKX_*` defines in `csrc/rankx.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DatatypeTag {
    /// 8-bit unsigned integer (`MPI_UINT8_T`)
    U8 = 0,
    /// 32-bit signed integer (`MPI_INT32_T`)
    I32 = 1,
}

impl DatatypeTag {
    /// Size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            DatatypeTag::U8 => 1,
            DatatypeTag::I32 => 4,
        }
    }
}

/// Trait for types that can be sent and received.
///
/// This is a **sealed trait**. Elements are moved as native-endian bytes, so
/// both ranks must run on hosts of the same byte order.
pub trait Datatype: sealed::Sealed + Copy + Send + 'static {
    /// The datatype tag used for dispatch to the transport.
    const TAG: DatatypeTag;

    /// Append the native-endian bytes of `items` to `out`.
    fn encode(items: &[Self], out: &mut Vec<u8>);

    /// Fill `items` from native-endian bytes; `bytes` holds exactly
    /// `items.len() * TAG.size()` bytes.
    fn decode(bytes: &[u8], items: &mut [Self]);
}

macro_rules! impl_datatype {
    ($ty:ty, $tag:expr, $to:expr, $from:expr) => {
        impl sealed::Sealed for $ty {}
        impl Datatype for $ty {
            const TAG: DatatypeTag = $tag;

            fn encode(items: &[Self], out: &mut Vec<u8>) {
                out.reserve(items.len() * Self::TAG.size());
                for item in items {
                    out.extend_from_slice(&$to(*item));
                }
            }

            fn decode(bytes: &[u8], items: &mut [Self]) {
                for (item, chunk) in items
                    .iter_mut()
                    .zip(bytes.chunks_exact(Self::TAG.size()))
                {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(chunk);
                    *item = $from(raw);
                }
            }
        }
    };
}

impl_datatype!(u8, DatatypeTag::U8, u8::to_ne_bytes, u8::from_ne_bytes);
impl_datatype!(i32, DatatypeTag::I32, i32::to_ne_bytes, i32::from_ne_bytes);
impl_datatype!(
    TransferUnit,
    DatatypeTag::U8,
    |unit: TransferUnit| [unit.0],
    |raw: [u8; 1]| TransferUnit(raw[0])
);

/// The single byte exchanged between the two participants.
///
/// Sender and receiver both declare their buffer as a `TransferUnit`, so the
/// two sides of the rendezvous cannot disagree on element type or size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct TransferUnit(pub u8);

impl TransferUnit {
    /// The value a buffer holds before anything is read into it.
    pub const SENTINEL: TransferUnit = TransferUnit(0x00);

    /// The raw byte.
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl From<u8> for TransferUnit {
    fn from(value: u8) -> Self {
        TransferUnit(value)
    }
}

impl From<TransferUnit> for u8 {
    fn from(unit: TransferUnit) -> Self {
        unit.0
    }
}

impl fmt::Display for TransferUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_ascii_graphic() {
            write!(f, "{:#04x} ({:?})", self.0, char::from(self.0))
        } else {
            write!(f, "{:#04x}", self.0)
        }
    }
}

/// Parses a decimal byte (`88`), a hex byte (`0x58`) or a single ASCII
/// character (`X`). Decimal wins for digits, so `"7"` is `0x07`.
impl FromStr for TransferUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // A lone space is a valid character seed
        let s = if s.chars().count() > 1 { s.trim() } else { s };
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            return u8::from_str_radix(hex, 16)
                .map(TransferUnit)
                .map_err(|e| Error::InvalidUnit(format!("bad hex byte {s:?}: {e}")));
        }
        if let Ok(value) = s.parse::<u8>() {
            return Ok(TransferUnit(value));
        }
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii() => Ok(TransferUnit(c as u8)),
            _ => Err(Error::InvalidUnit(format!(
                "{s:?} is not a byte (use 0-255, 0x00-0xff or one ASCII character)"
            ))),
        }
    }
}
