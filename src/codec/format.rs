//! Format parameters and the leader/directory layouts they imply.
//!
//! Four record layouts exist, selected by two flags:
//!
//! ```text
//! standard, filler 0   mfn:4 len:2        bwb:4 bwp:2        base:2 nvf:2 status:2   (18)
//! standard, filler 2   mfn:4 len:2 pad:2  bwb:4 bwp:2        base:2 nvf:2 status:2   (20)
//! extended, filler 0   mfn:4 len:4        bwb:4 bwp:2        base:4 nvf:2 status:2   (22)
//! extended, filler 2   mfn:4 len:4        bwb:4 bwp:2 pad:2  base:4 nvf:2 status:2   (24)
//! ```
//!
//! Directory entries are `tag:2 pos:2 len:2` (standard), `tag:2 pos:4 len:4`
//! (extended) or `tag:2 pad:2 pos:4 len:4` (extended with filler).

use serde::{Deserialize, Serialize};

use crate::binary::ByteOrder;
use crate::errors::{MstError, MstResult};

/// Largest record in the standard format.
pub const MAX_STANDARD_RECORD: usize = 32_767;
/// Largest record in the extended format (64 MiB).
pub const MAX_EXTENDED_RECORD: usize = 67_108_864;
/// Largest supported address-space shift.
pub const MAX_SHIFT: u8 = 9;
/// Bytes needed to tell all four layouts apart.
pub const LEADER_PROBE_LEN: usize = 22;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormatParams {
    byte_order: ByteOrder,
    extended: bool,
    filler: u8,
    shift: u8,
}

impl FormatParams {
    pub fn new(byte_order: ByteOrder, extended: bool, filler: u8, shift: u8) -> MstResult<Self> {
        if filler != 0 && filler != 2 {
            return Err(MstError::config(format!("filler must be 0 or 2, got {}", filler)));
        }
        if shift > MAX_SHIFT {
            return Err(MstError::config(format!(
                "shift must be 0..={}, got {}",
                MAX_SHIFT, shift
            )));
        }
        Ok(Self {
            byte_order,
            extended,
            filler,
            shift,
        })
    }

    /// Standard format, direct byte order, no filler, default address space.
    pub fn standard() -> Self {
        Self {
            byte_order: ByteOrder::Direct,
            extended: false,
            filler: 0,
            shift: 0,
        }
    }

    /// The four layout variants in detection order.
    pub fn variants(byte_order: ByteOrder, shift: u8) -> [FormatParams; 4] {
        let make = |extended, filler| FormatParams {
            byte_order,
            extended,
            filler,
            shift: shift.min(MAX_SHIFT),
        };
        [make(false, 0), make(false, 2), make(true, 0), make(true, 2)]
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }

    pub fn filler(&self) -> u8 {
        self.filler
    }

    pub fn shift(&self) -> u8 {
        self.shift
    }

    pub fn with_byte_order(self, byte_order: ByteOrder) -> Self {
        Self { byte_order, ..self }
    }

    pub fn with_shift(self, shift: u8) -> Self {
        Self {
            shift: shift.min(MAX_SHIFT),
            ..self
        }
    }

    /// Width of the length, base, and directory pos/len fields.
    pub fn wide(&self) -> usize {
        if self.extended {
            4
        } else {
            2
        }
    }

    pub fn length_at(&self) -> usize {
        4
    }

    pub fn back_block_at(&self) -> usize {
        let pad = if self.extended { 0 } else { self.filler as usize };
        self.length_at() + self.wide() + pad
    }

    pub fn back_offset_at(&self) -> usize {
        self.back_block_at() + 4
    }

    pub fn base_at(&self) -> usize {
        let pad = if self.extended { self.filler as usize } else { 0 };
        self.back_offset_at() + 2 + pad
    }

    pub fn field_count_at(&self) -> usize {
        self.base_at() + self.wide()
    }

    pub fn status_at(&self) -> usize {
        self.field_count_at() + 2
    }

    /// Fixed leader size, fillers included.
    pub fn header_size(&self) -> usize {
        self.status_at() + 2
    }

    /// Directory entry size.
    pub fn entry_size(&self) -> usize {
        let pad = if self.extended { self.filler as usize } else { 0 };
        2 + pad + 2 * self.wide()
    }

    /// Offset of the pos field inside a directory entry.
    pub fn entry_pos_at(&self) -> usize {
        if self.extended {
            2 + self.filler as usize
        } else {
            2
        }
    }

    /// Where the data area must start for `field_count` fields.
    pub fn expected_base(&self, field_count: usize) -> usize {
        self.header_size() + field_count * self.entry_size()
    }

    pub fn max_record_len(&self) -> usize {
        if self.extended {
            MAX_EXTENDED_RECORD
        } else {
            MAX_STANDARD_RECORD
        }
    }

    pub fn min_record_len(&self) -> usize {
        self.header_size()
    }

    /// Record start alignment in the master file.
    pub fn record_alignment(&self) -> u64 {
        (1u64 << self.shift).max(2)
    }

    pub fn describe(&self) -> String {
        format!(
            "{} filler={} order={} shift={}",
            if self.extended { "extended" } else { "standard" },
            self.filler,
            self.byte_order,
            self.shift
        )
    }
}

impl Default for FormatParams {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(extended: bool, filler: u8) -> FormatParams {
        FormatParams::new(ByteOrder::Direct, extended, filler, 0).unwrap()
    }

    #[test]
    fn test_header_sizes() {
        assert_eq!(params(false, 0).header_size(), 18);
        assert_eq!(params(false, 2).header_size(), 20);
        assert_eq!(params(true, 0).header_size(), 22);
        assert_eq!(params(true, 2).header_size(), 24);
    }

    #[test]
    fn test_entry_sizes() {
        assert_eq!(params(false, 0).entry_size(), 6);
        assert_eq!(params(false, 2).entry_size(), 6);
        assert_eq!(params(true, 0).entry_size(), 10);
        assert_eq!(params(true, 2).entry_size(), 12);
    }

    #[test]
    fn test_filler_positions() {
        let std2 = params(false, 2);
        assert_eq!(std2.back_block_at(), 8);
        assert_eq!(std2.base_at(), 14);
        let ext2 = params(true, 2);
        assert_eq!(ext2.back_block_at(), 8);
        assert_eq!(ext2.base_at(), 16);
        assert_eq!(ext2.field_count_at(), 20);
        assert_eq!(ext2.entry_pos_at(), 4);
    }

    #[test]
    fn test_probe_window_covers_field_count() {
        for p in FormatParams::variants(ByteOrder::Direct, 0) {
            assert!(p.field_count_at() + 2 <= LEADER_PROBE_LEN);
        }
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(FormatParams::new(ByteOrder::Direct, false, 1, 0).is_err());
        assert!(FormatParams::new(ByteOrder::Direct, false, 0, 10).is_err());
    }

    #[test]
    fn test_alignment_follows_shift() {
        assert_eq!(params(false, 0).record_alignment(), 2);
        assert_eq!(params(false, 0).with_shift(6).record_alignment(), 64);
    }
}
