//! Cross-reference file blocks.
//!
//! ```text
//! block n (512 bytes):
//! +--------+--------+--------+-----+----------+
//! | header | slot 1 | slot 2 | ... | slot 127 |   128 x i32
//! +--------+--------+--------+-----+----------+
//! ```
//!
//! The header is `-n` while block `n` is the last one in the file and `n`
//! once a following block exists.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::binary::ByteOrder;
use crate::errors::{MstError, MstResult};
use crate::record::BLOCK_SIZE;

/// Pointer slots per block, header excluded.
pub const SLOTS_PER_BLOCK: u32 = 127;
const WORDS_PER_BLOCK: usize = 128;

/// Block (1-based) and slot (1..=127) holding the pointer for `mfn`.
pub fn locate(mfn: u32) -> MstResult<(u32, usize)> {
    if mfn == 0 {
        return Err(MstError::range("mfn 0 has no cross-reference slot"));
    }
    let block = (mfn - 1) / SLOTS_PER_BLOCK + 1;
    let slot = ((mfn - 1) % SLOTS_PER_BLOCK + 1) as usize;
    Ok((block, slot))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XrfBlock {
    words: [i32; WORDS_PER_BLOCK],
}

impl XrfBlock {
    /// An empty block that is the last one in the file.
    pub fn new_last(block: u32) -> Self {
        let mut words = [0; WORDS_PER_BLOCK];
        words[0] = -(block as i32);
        Self { words }
    }

    pub fn from_bytes(buf: &[u8], order: ByteOrder) -> Self {
        let mut words = [0; WORDS_PER_BLOCK];
        for (i, word) in words.iter_mut().enumerate() {
            *word = order.read_i32(&buf[i * 4..]);
        }
        Self { words }
    }

    pub fn to_bytes(&self, order: ByteOrder) -> [u8; BLOCK_SIZE as usize] {
        let mut buf = [0u8; BLOCK_SIZE as usize];
        for (i, word) in self.words.iter().enumerate() {
            order.write_i32(&mut buf[i * 4..], *word);
        }
        buf
    }

    pub fn header(&self) -> i32 {
        self.words[0]
    }

    pub fn set_header(&mut self, value: i32) {
        self.words[0] = value;
    }

    pub fn slot(&self, slot: usize) -> i32 {
        self.words[slot]
    }

    pub fn set_slot(&mut self, slot: usize, value: i32) {
        self.words[slot] = value;
    }
}

/// Raw block-level access to a `.xrf` file.
#[derive(Debug)]
pub struct XrfFile {
    path: PathBuf,
    file: File,
    order: ByteOrder,
    blocks: u32,
}

impl XrfFile {
    /// Creates (or truncates) a cross-reference file holding one empty block.
    pub fn create(path: &Path, order: ByteOrder) -> MstResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| {
                MstError::io(format!("Failed to create xrf file: {}", path.display()), e)
            })?;
        let mut xrf = Self {
            path: path.to_path_buf(),
            file,
            order,
            blocks: 0,
        };
        xrf.append_block()?;
        Ok(xrf)
    }

    /// Opens an existing cross-reference file.
    pub fn open(path: &Path, order: ByteOrder) -> MstResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    MstError::format(format!(
                        "missing cross-reference file: {}",
                        path.display()
                    ))
                } else {
                    MstError::io(format!("Failed to open xrf file: {}", path.display()), e)
                }
            })?;
        let len = file
            .metadata()
            .map_err(|e| MstError::io("Failed to read xrf metadata", e))?
            .len();
        if len == 0 || len % BLOCK_SIZE != 0 {
            return Err(MstError::format(format!(
                "xrf file {} has size {}, not a positive multiple of {}",
                path.display(),
                len,
                BLOCK_SIZE
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
            file,
            order,
            blocks: (len / BLOCK_SIZE) as u32,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    pub fn block_count(&self) -> u32 {
        self.blocks
    }

    /// Re-reads the file length. Other handles on the same file may have
    /// appended blocks since this one was opened; the count never shrinks.
    pub fn refresh_len(&mut self) -> MstResult<u32> {
        let len = self
            .file
            .metadata()
            .map_err(|e| MstError::io("Failed to read xrf metadata", e))?
            .len();
        let on_disk = (len / BLOCK_SIZE) as u32;
        if on_disk > self.blocks {
            self.blocks = on_disk;
        }
        Ok(self.blocks)
    }

    fn block_offset(block: u32) -> u64 {
        u64::from(block - 1) * BLOCK_SIZE
    }

    /// Reads a whole block. Blocks past the end read as an empty last block.
    pub fn read_block(&mut self, block: u32) -> MstResult<XrfBlock> {
        if block > self.blocks && block > self.refresh_len()? {
            return Ok(XrfBlock::new_last(block));
        }
        let mut buf = [0u8; BLOCK_SIZE as usize];
        self.file
            .seek(SeekFrom::Start(Self::block_offset(block)))
            .and_then(|_| self.file.read_exact(&mut buf))
            .map_err(|e| MstError::io(format!("Failed to read xrf block {}", block), e))?;
        Ok(XrfBlock::from_bytes(&buf, self.order))
    }

    /// Writes a whole block that already exists in the file.
    pub fn write_block(&mut self, block: u32, data: &XrfBlock) -> MstResult<()> {
        self.file
            .seek(SeekFrom::Start(Self::block_offset(block)))
            .and_then(|_| self.file.write_all(&data.to_bytes(self.order)))
            .map_err(|e| MstError::io(format!("Failed to write xrf block {}", block), e))
    }

    /// Reads one word. Words past the end read as 0.
    pub fn read_word(&mut self, block: u32, slot: usize) -> MstResult<i32> {
        if block > self.blocks && block > self.refresh_len()? {
            return Ok(0);
        }
        let mut buf = [0u8; 4];
        self.file
            .seek(SeekFrom::Start(Self::block_offset(block) + slot as u64 * 4))
            .and_then(|_| self.file.read_exact(&mut buf))
            .map_err(|e| {
                MstError::io(format!("Failed to read xrf slot {}/{}", block, slot), e)
            })?;
        Ok(self.order.read_i32(&buf))
    }

    pub fn write_word(&mut self, block: u32, slot: usize, value: i32) -> MstResult<()> {
        let mut buf = [0u8; 4];
        self.order.write_i32(&mut buf, value);
        self.file
            .seek(SeekFrom::Start(Self::block_offset(block) + slot as u64 * 4))
            .and_then(|_| self.file.write_all(&buf))
            .map_err(|e| {
                MstError::io(format!("Failed to write xrf slot {}/{}", block, slot), e)
            })
    }

    /// Grows the file until `block` exists. Every block that stops being the
    /// last one gets its header flipped positive.
    pub fn extend_to(&mut self, block: u32) -> MstResult<()> {
        self.refresh_len()?;
        while self.blocks < block {
            if self.blocks > 0 {
                self.write_word(self.blocks, 0, self.blocks as i32)?;
            }
            self.append_block()?;
        }
        Ok(())
    }

    /// Appends an empty last block, unless another handle already did.
    fn append_block(&mut self) -> MstResult<()> {
        let next = self.blocks + 1;
        if self.refresh_len()? >= next {
            return Ok(());
        }
        self.file
            .seek(SeekFrom::Start(Self::block_offset(next)))
            .and_then(|_| self.file.write_all(&XrfBlock::new_last(next).to_bytes(self.order)))
            .map_err(|e| MstError::io(format!("Failed to append xrf block {}", next), e))?;
        self.blocks = next;
        Ok(())
    }

    /// Rewrites the whole file from in-memory blocks.
    pub fn write_all_blocks(&mut self, blocks: &[XrfBlock]) -> MstResult<()> {
        let mut bytes = Vec::with_capacity(blocks.len() * BLOCK_SIZE as usize);
        for block in blocks {
            bytes.extend_from_slice(&block.to_bytes(self.order));
        }
        self.file
            .seek(SeekFrom::Start(0))
            .and_then(|_| self.file.write_all(&bytes))
            .and_then(|_| self.file.set_len(bytes.len() as u64))
            .map_err(|e| MstError::io("Failed to rewrite xrf file", e))?;
        self.blocks = blocks.len() as u32;
        Ok(())
    }

    pub fn sync(&mut self) -> MstResult<()> {
        self.file
            .sync_data()
            .map_err(|e| MstError::io("Failed to sync xrf file", e))
    }
}
