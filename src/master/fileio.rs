//! Positioned reads and writes on a shared master file handle.
//!
//! The master handle is shared with the lock manager, so nothing relies on
//! the file cursor between calls.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::errors::{MstError, MstResult};

pub(crate) fn read_exact_at(file: &File, offset: u64, buf: &mut [u8]) -> MstResult<()> {
    let mut handle = file;
    handle
        .seek(SeekFrom::Start(offset))
        .and_then(|_| handle.read_exact(buf))
        .map_err(|e| {
            MstError::io(
                format!("Failed to read {} bytes at offset {}", buf.len(), offset),
                e,
            )
        })
}

/// Reads up to `buf.len()` bytes; returns how many were available.
pub(crate) fn read_at_most(file: &File, offset: u64, buf: &mut [u8]) -> MstResult<usize> {
    let mut handle = file;
    handle
        .seek(SeekFrom::Start(offset))
        .map_err(|e| MstError::io(format!("Failed to seek to offset {}", offset), e))?;
    let mut filled = 0;
    while filled < buf.len() {
        match handle.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(MstError::io(
                    format!("Failed to read at offset {}", offset),
                    e,
                ))
            }
        }
    }
    Ok(filled)
}

pub(crate) fn write_all_at(file: &File, offset: u64, buf: &[u8]) -> MstResult<()> {
    let mut handle = file;
    handle
        .seek(SeekFrom::Start(offset))
        .and_then(|_| handle.write_all(buf))
        .map_err(|e| {
            MstError::io(
                format!("Failed to write {} bytes at offset {}", buf.len(), offset),
                e,
            )
        })
}

pub(crate) fn file_len(file: &File) -> MstResult<u64> {
    file.metadata()
        .map(|m| m.len())
        .map_err(|e| MstError::io("Failed to read master metadata", e))
}
