//! Format detection for existing databases
//!
//! Two independent heuristics:
//!
//! 1. Byte order. The control record's next write position, decoded under
//!    the right byte order, lands close to the end of the master file; under
//!    the wrong one it points nowhere near it.
//! 2. Record layout. The first record that still has a master image is
//!    probed with each layout in turn (standard/0, standard/2, extended/0,
//!    extended/2). A layout matches when its directory base equals the
//!    leader size plus `field_count` directory entries.
//!
//! A database with no record images carries no layout evidence;
//! [`detect_layout`] returns `None` and the caller falls back to
//! [`platform_default_filler`].

use std::fs::File;

use crate::binary::ByteOrder;
use crate::codec::{FormatParams, LEADER_PROBE_LEN};
use crate::errors::{MstError, MstResult};
use crate::master::fileio::read_at_most;
use crate::record::{Position, BLOCK_SIZE};
use crate::xrf::{locate, XrfEntry, XrfFile};

/// Largest distance between the predicted next write position and the
/// actual file size for a byte order to be accepted.
pub const BYTE_ORDER_TOLERANCE: u64 = 1024;

/// Filler used when nothing can be detected: legacy Windows builds packed
/// their structures, everything else padded them.
pub fn platform_default_filler() -> u8 {
    if cfg!(windows) {
        0
    } else {
        2
    }
}

/// Predicted next write offset under `order`, if the control words are sane.
fn predicted_next_offset(control: &[u8], order: ByteOrder) -> Option<u64> {
    let next_mfn = order.read_i32(&control[4..]);
    let block = order.read_i32(&control[8..]);
    let offset = order.read_u16(&control[12..]);
    if next_mfn < 1 || block < 1 || u64::from(offset) >= BLOCK_SIZE {
        return None;
    }
    Some(Position::new(block as u32, offset).file_offset())
}

/// Infers the byte order from the first bytes of a master file.
pub fn detect_byte_order(control: &[u8], file_len: u64) -> MstResult<ByteOrder> {
    if control.len() < 14 {
        return Err(MstError::format("master file too short to hold a control record"));
    }
    ByteOrder::CANDIDATES
        .into_iter()
        .find(|&order| {
            predicted_next_offset(control, order)
                .map(|next| next.abs_diff(file_len) <= BYTE_ORDER_TOLERANCE)
                .unwrap_or(false)
        })
        .ok_or_else(|| {
            MstError::format("unrecognized format: no byte order matches the control record")
                .with_details(format!("file_len: {}", file_len))
        })
}

/// Whether the leader window of record `mfn` is consistent with `params`.
pub fn probe_matches(probe: &[u8], params: &FormatParams, mfn: u32) -> bool {
    if probe.len() < params.field_count_at() + 2 {
        return false;
    }
    let order = params.byte_order();
    if order.read_u32(probe) != mfn {
        return false;
    }
    let length = order.read_int(&probe[params.length_at()..], params.wide()).unsigned_abs() as usize;
    if length < params.min_record_len() || length > params.max_record_len() {
        return false;
    }
    let base = order.read_uint(&probe[params.base_at()..], params.wide()) as usize;
    let field_count = order.read_u16(&probe[params.field_count_at()..]) as usize;
    base == params.expected_base(field_count) && base <= length
}

/// Probes the first record with a master image and returns the layout it
/// was written with. `Ok(None)` means no record image exists.
pub fn detect_layout(
    master: &File,
    xrf: &mut XrfFile,
    next_mfn: u32,
    order: ByteOrder,
    shift: u8,
) -> MstResult<Option<FormatParams>> {
    for mfn in 1..next_mfn {
        let (block, slot) = locate(mfn)?;
        let entry = XrfEntry::unpack(xrf.read_word(block, slot)?, shift);
        if entry.is_tombstone() {
            continue;
        }

        let at = entry.position.file_offset();
        let mut probe = [0u8; LEADER_PROBE_LEN];
        let got = read_at_most(master, at, &mut probe)?;

        return FormatParams::variants(order, shift)
            .into_iter()
            .find(|params| probe_matches(&probe[..got], params, mfn))
            .map(Some)
            .ok_or_else(|| {
                MstError::format_at_offset(
                    at,
                    format!("unrecognized format: leader of mfn {} matches no layout", mfn),
                )
            });
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Encoding, RecordCodec};
    use crate::master::ControlRecord;
    use crate::record::Record;

    #[test]
    fn test_byte_order_from_control() {
        let control = ControlRecord::new(Position::new(3, 100), 0);
        let len = 3 * BLOCK_SIZE;
        let direct = control.encode(ByteOrder::Direct);
        let swapped = control.encode(ByteOrder::Swapped);
        assert_eq!(detect_byte_order(&direct, len).unwrap(), ByteOrder::Direct);
        assert_eq!(detect_byte_order(&swapped, len).unwrap(), ByteOrder::Swapped);
    }

    #[test]
    fn test_byte_order_far_from_file_size() {
        let control = ControlRecord::new(Position::new(3, 100), 0);
        let err = detect_byte_order(&control.encode(ByteOrder::Direct), 100 * BLOCK_SIZE)
            .unwrap_err();
        assert!(err.message().contains("unrecognized format"));
    }

    #[test]
    fn test_probe_picks_the_writing_layout() {
        for order in ByteOrder::CANDIDATES {
            for written in FormatParams::variants(order, 0) {
                let codec = RecordCodec::new(written, Encoding::Cp1252);
                let mut record = Record::with_mfn(4);
                record.add_field(10, "Lovelace, Ada").add_field(24, "Notes");
                let bytes = codec.encode(&record).unwrap();
                let found = FormatParams::variants(order, 0)
                    .into_iter()
                    .find(|p| probe_matches(&bytes[..LEADER_PROBE_LEN], p, 4));
                assert_eq!(found, Some(written), "{}", written.describe());
            }
        }
    }

    #[test]
    fn test_probe_rejects_wrong_mfn() {
        let params = FormatParams::standard();
        let codec = RecordCodec::new(params, Encoding::Cp1252);
        let bytes = codec.encode(&Record::with_mfn(2).field_with(1, "x")).unwrap();
        assert!(probe_matches(&bytes, &params, 2));
        assert!(!probe_matches(&bytes, &params, 3));
    }

    #[test]
    fn test_platform_filler_is_valid() {
        assert!(matches!(platform_default_filler(), 0 | 2));
    }
}
