//! Record leader and directory entries.

use crate::errors::{MstError, MstResult};
use crate::record::Position;

use super::format::FormatParams;

/// Status word values in the leader.
pub const LEADER_ACTIVE: u16 = 0;
pub const LEADER_DELETED: u16 = 1;

/// Fixed physical header at the start of every on-disk record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Leader {
    pub mfn: u32,
    /// Magnitude of the stored length.
    pub length: u32,
    /// Stored length was negative.
    pub locked: bool,
    pub back_pointer: Position,
    pub base: u32,
    pub field_count: u16,
    pub status: u16,
}

impl Leader {
    /// Decodes the leader from the first `header_size()` bytes of `buf`.
    pub fn decode(buf: &[u8], params: &FormatParams) -> MstResult<Self> {
        if buf.len() < params.header_size() {
            return Err(MstError::format(format!(
                "leader needs {} bytes, got {}",
                params.header_size(),
                buf.len()
            )));
        }
        let order = params.byte_order();
        let wide = params.wide();
        let stored = order.read_int(&buf[params.length_at()..], wide);
        let back_block = order.read_i32(&buf[params.back_block_at()..]);
        if back_block < 0 {
            return Err(MstError::format(format!(
                "negative backward pointer block {}",
                back_block
            )));
        }
        Ok(Self {
            mfn: order.read_u32(&buf[0..]),
            length: stored.unsigned_abs(),
            locked: stored < 0,
            back_pointer: Position::new(
                back_block as u32,
                order.read_u16(&buf[params.back_offset_at()..]),
            ),
            base: order.read_uint(&buf[params.base_at()..], wide),
            field_count: order.read_u16(&buf[params.field_count_at()..]),
            status: order.read_u16(&buf[params.status_at()..]),
        })
    }

    /// Writes the leader into the first `header_size()` bytes of `buf`.
    /// Filler bytes are zeroed.
    pub fn encode_into(&self, buf: &mut [u8], params: &FormatParams) {
        let order = params.byte_order();
        let wide = params.wide();
        buf[..params.header_size()].fill(0);
        order.write_u32(&mut buf[0..], self.mfn);
        let stored = if self.locked {
            -(self.length as i32)
        } else {
            self.length as i32
        };
        order.write_int(&mut buf[params.length_at()..], wide, stored);
        order.write_i32(&mut buf[params.back_block_at()..], self.back_pointer.block as i32);
        order.write_u16(&mut buf[params.back_offset_at()..], self.back_pointer.offset);
        order.write_uint(&mut buf[params.base_at()..], wide, self.base);
        order.write_u16(&mut buf[params.field_count_at()..], self.field_count);
        order.write_u16(&mut buf[params.status_at()..], self.status);
    }

    /// Checks the directory base against the arithmetic for `field_count`.
    pub fn base_matches(&self, params: &FormatParams) -> bool {
        self.base as usize == params.expected_base(self.field_count as usize)
    }
}

/// One directory slot: tag plus placement relative to the data base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub tag: u16,
    pub offset: u32,
    pub length: u32,
}

impl DirectoryEntry {
    pub fn decode(buf: &[u8], params: &FormatParams) -> Self {
        let order = params.byte_order();
        let wide = params.wide();
        let pos_at = params.entry_pos_at();
        Self {
            tag: order.read_u16(buf),
            offset: order.read_uint(&buf[pos_at..], wide),
            length: order.read_uint(&buf[pos_at + wide..], wide),
        }
    }

    pub fn encode_into(&self, buf: &mut [u8], params: &FormatParams) {
        let order = params.byte_order();
        let wide = params.wide();
        let pos_at = params.entry_pos_at();
        buf[..params.entry_size()].fill(0);
        order.write_u16(buf, self.tag);
        order.write_uint(&mut buf[pos_at..], wide, self.offset);
        order.write_uint(&mut buf[pos_at + wide..], wide, self.length);
    }
}
