//! Fixed-width integer packing with a selectable byte order.
//!
//! Legacy master files exist in two flavours: "direct" files written on
//! little-endian hosts and "swapped" files written on big-endian hosts.
//! Every multi-byte integer on disk (control record, leaders, directory
//! entries, cross-reference pointers) goes through these helpers.

use byteorder::{BigEndian, ByteOrder as Endian, LittleEndian};
use serde::{Deserialize, Serialize};

/// Byte order of every integer in a master/cross-reference file pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// Little-endian
    Direct,
    /// Big-endian
    Swapped,
}

impl ByteOrder {
    /// Both candidates, in the order the format detector tries them.
    pub const CANDIDATES: [ByteOrder; 2] = [ByteOrder::Direct, ByteOrder::Swapped];

    pub fn is_swapped(self) -> bool {
        self == ByteOrder::Swapped
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ByteOrder::Direct => "direct",
            ByteOrder::Swapped => "swapped",
        }
    }

    pub fn read_u16(self, buf: &[u8]) -> u16 {
        match self {
            ByteOrder::Direct => LittleEndian::read_u16(buf),
            ByteOrder::Swapped => BigEndian::read_u16(buf),
        }
    }

    pub fn read_i16(self, buf: &[u8]) -> i16 {
        match self {
            ByteOrder::Direct => LittleEndian::read_i16(buf),
            ByteOrder::Swapped => BigEndian::read_i16(buf),
        }
    }

    pub fn read_u32(self, buf: &[u8]) -> u32 {
        match self {
            ByteOrder::Direct => LittleEndian::read_u32(buf),
            ByteOrder::Swapped => BigEndian::read_u32(buf),
        }
    }

    pub fn read_i32(self, buf: &[u8]) -> i32 {
        match self {
            ByteOrder::Direct => LittleEndian::read_i32(buf),
            ByteOrder::Swapped => BigEndian::read_i32(buf),
        }
    }

    pub fn write_u16(self, buf: &mut [u8], value: u16) {
        match self {
            ByteOrder::Direct => LittleEndian::write_u16(buf, value),
            ByteOrder::Swapped => BigEndian::write_u16(buf, value),
        }
    }

    pub fn write_i16(self, buf: &mut [u8], value: i16) {
        match self {
            ByteOrder::Direct => LittleEndian::write_i16(buf, value),
            ByteOrder::Swapped => BigEndian::write_i16(buf, value),
        }
    }

    pub fn write_u32(self, buf: &mut [u8], value: u32) {
        match self {
            ByteOrder::Direct => LittleEndian::write_u32(buf, value),
            ByteOrder::Swapped => BigEndian::write_u32(buf, value),
        }
    }

    pub fn write_i32(self, buf: &mut [u8], value: i32) {
        match self {
            ByteOrder::Direct => LittleEndian::write_i32(buf, value),
            ByteOrder::Swapped => BigEndian::write_i32(buf, value),
        }
    }

    /// Reads an unsigned value of `width` bytes (2 or 4).
    pub fn read_uint(self, buf: &[u8], width: usize) -> u32 {
        match width {
            2 => u32::from(self.read_u16(buf)),
            _ => self.read_u32(buf),
        }
    }

    /// Writes an unsigned value of `width` bytes (2 or 4). The caller has
    /// already checked that `value` fits.
    pub fn write_uint(self, buf: &mut [u8], width: usize, value: u32) {
        match width {
            2 => self.write_u16(buf, value as u16),
            _ => self.write_u32(buf, value),
        }
    }

    /// Reads a signed value of `width` bytes (2 or 4), sign-extended.
    pub fn read_int(self, buf: &[u8], width: usize) -> i32 {
        match width {
            2 => i32::from(self.read_i16(buf)),
            _ => self.read_i32(buf),
        }
    }

    /// Writes a signed value of `width` bytes (2 or 4).
    pub fn write_int(self, buf: &mut [u8], width: usize, value: i32) {
        match width {
            2 => self.write_i16(buf, value as i16),
            _ => self.write_i32(buf, value),
        }
    }
}

impl Default for ByteOrder {
    fn default() -> Self {
        ByteOrder::Direct
    }
}

impl std::fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rounds `value` up to the next multiple of `align` (a power of two).
pub fn align_up(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}
