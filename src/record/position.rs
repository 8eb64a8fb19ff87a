//! Physical addresses inside the master file.

use serde::{Deserialize, Serialize};

/// Size of a master or cross-reference file block.
pub const BLOCK_SIZE: u64 = 512;

/// A (block, offset) address in the master file.
///
/// Blocks are 1-based; `offset` is the byte offset inside the block
/// (always below [`BLOCK_SIZE`]). The all-zero position means "none" and is
/// used for records without a previous version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub block: u32,
    pub offset: u16,
}

impl Position {
    pub const NONE: Position = Position { block: 0, offset: 0 };

    pub fn new(block: u32, offset: u16) -> Self {
        Self { block, offset }
    }

    /// Converts an absolute byte offset into a block address.
    pub fn from_file_offset(file_offset: u64) -> Self {
        Self {
            block: (file_offset / BLOCK_SIZE) as u32 + 1,
            offset: (file_offset % BLOCK_SIZE) as u16,
        }
    }

    /// Absolute byte offset of this address. `None` maps to 0.
    pub fn file_offset(&self) -> u64 {
        if self.block == 0 {
            return 0;
        }
        (u64::from(self.block) - 1) * BLOCK_SIZE + u64::from(self.offset)
    }

    pub fn is_none(&self) -> bool {
        self.block == 0 && self.offset == 0
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.block, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_offset_conversion() {
        let pos = Position::from_file_offset(1000);
        assert_eq!(pos, Position::new(2, 488));
        assert_eq!(pos.file_offset(), 1000);
    }

    #[test]
    fn test_first_block_is_one() {
        assert_eq!(Position::from_file_offset(32), Position::new(1, 32));
    }

    #[test]
    fn test_none_position() {
        assert!(Position::NONE.is_none());
        assert_eq!(Position::NONE.file_offset(), 0);
        assert!(!Position::new(1, 0).is_none());
    }
}
