//! Runtime strategies for the cross-reference store.
//!
//! All three share the same pointer contract and block structure; they
//! differ only in how much of the file they keep in memory:
//!
//! - [`DirectXrf`]: one read or write per pointer access
//! - [`PagedXrf`]: exactly one block resident, flushed on block switch,
//!   on flush/close, or on every write when write-through is enabled
//! - [`MemoryXrf`]: every block resident, written back on flush/close

use std::path::Path;
use std::sync::Arc;

use crate::errors::{MstError, MstResult};
use crate::observability::{log_event_with_fields, EngineMetrics, Event};

use super::entry::XrfEntry;
use super::file::{locate, XrfBlock, XrfFile, SLOTS_PER_BLOCK};

/// Pointer-level access to a cross-reference file.
pub trait XrfStore {
    fn read(&mut self, mfn: u32) -> MstResult<XrfEntry>;

    fn write(&mut self, mfn: u32, entry: XrfEntry) -> MstResult<()>;

    /// Persists any buffered blocks.
    fn flush(&mut self) -> MstResult<()>;

    fn shift(&self) -> u8;

    fn block_count(&self) -> u32;

    fn close(&mut self) -> MstResult<()> {
        self.flush()
    }
}

fn log_extension(path: &Path, blocks: u32) {
    log_event_with_fields(
        Event::XrfBlockExtended,
        &[
            ("blocks", blocks.to_string().as_str()),
            ("path", path.display().to_string().as_str()),
        ],
    );
}

pub struct DirectXrf {
    file: XrfFile,
    shift: u8,
}

impl DirectXrf {
    pub fn new(file: XrfFile, shift: u8) -> Self {
        Self { file, shift }
    }

    /// Only logs when this handle actually grew the file; another handle
    /// may already have appended the block.
    fn extend_to(&mut self, block: u32) -> MstResult<()> {
        let before = self.file.refresh_len()?;
        self.file.extend_to(block)?;
        if self.file.block_count() > before {
            log_extension(self.file.path(), self.file.block_count());
        }
        Ok(())
    }
}

impl XrfStore for DirectXrf {
    fn read(&mut self, mfn: u32) -> MstResult<XrfEntry> {
        let (block, slot) = locate(mfn)?;
        Ok(XrfEntry::unpack(self.file.read_word(block, slot)?, self.shift))
    }

    fn write(&mut self, mfn: u32, entry: XrfEntry) -> MstResult<()> {
        let (block, slot) = locate(mfn)?;
        let word = entry.pack(self.shift)?;
        if block > self.file.block_count() {
            self.extend_to(block)?;
        }
        self.file.write_word(block, slot, word)?;
        if slot as u32 == SLOTS_PER_BLOCK {
            self.extend_to(block + 1)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> MstResult<()> {
        self.file.sync()
    }

    fn shift(&self) -> u8 {
        self.shift
    }

    fn block_count(&self) -> u32 {
        self.file.block_count()
    }
}

struct Page {
    block: u32,
    data: XrfBlock,
    dirty: bool,
}

pub struct PagedXrf {
    file: XrfFile,
    shift: u8,
    write_through: bool,
    page: Option<Page>,
    metrics: Arc<EngineMetrics>,
}

impl PagedXrf {
    pub fn new(file: XrfFile, shift: u8, write_through: bool, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            file,
            shift,
            write_through,
            page: None,
            metrics,
        }
    }

    /// Number of the resident block, if any.
    pub fn resident_block(&self) -> Option<u32> {
        self.page.as_ref().map(|p| p.block)
    }

    fn flush_page(&mut self) -> MstResult<()> {
        if let Some(page) = self.page.as_mut() {
            if page.dirty {
                self.file.write_block(page.block, &page.data)?;
                page.dirty = false;
                self.metrics.increment_xrf_page_flushes();
            }
        }
        Ok(())
    }

    fn load(&mut self, block: u32) -> MstResult<&mut Page> {
        if self.resident_block() != Some(block) {
            self.flush_page()?;
            let data = self.file.read_block(block)?;
            self.metrics.increment_xrf_page_loads();
            return Ok(self.page.insert(Page {
                block,
                data,
                dirty: false,
            }));
        }
        self.page
            .as_mut()
            .ok_or_else(|| MstError::state("xrf page cache lost its resident block"))
    }

    /// Extends the file on disk. The resident page is written back first
    /// and dropped because extension rewrites block headers.
    fn extend_to(&mut self, block: u32) -> MstResult<()> {
        self.flush_page()?;
        self.page = None;
        self.file.extend_to(block)?;
        log_extension(self.file.path(), self.file.block_count());
        Ok(())
    }
}

impl XrfStore for PagedXrf {
    fn read(&mut self, mfn: u32) -> MstResult<XrfEntry> {
        let (block, slot) = locate(mfn)?;
        let shift = self.shift;
        let page = self.load(block)?;
        Ok(XrfEntry::unpack(page.data.slot(slot), shift))
    }

    fn write(&mut self, mfn: u32, entry: XrfEntry) -> MstResult<()> {
        let (block, slot) = locate(mfn)?;
        let word = entry.pack(self.shift)?;
        if block > self.file.block_count() {
            self.extend_to(block)?;
        }
        let page = self.load(block)?;
        page.data.set_slot(slot, word);
        page.dirty = true;

        if slot as u32 == SLOTS_PER_BLOCK {
            self.extend_to(block + 1)?;
        } else if self.write_through {
            self.flush_page()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> MstResult<()> {
        self.flush_page()?;
        self.file.sync()
    }

    fn shift(&self) -> u8 {
        self.shift
    }

    fn block_count(&self) -> u32 {
        self.file.block_count()
    }
}

pub struct MemoryXrf {
    file: XrfFile,
    shift: u8,
    blocks: Vec<XrfBlock>,
    dirty: bool,
}

impl MemoryXrf {
    /// Loads every block of `file`.
    pub fn load(mut file: XrfFile, shift: u8) -> MstResult<Self> {
        let blocks = (1..=file.block_count())
            .map(|b| file.read_block(b))
            .collect::<MstResult<Vec<_>>>()?;
        Ok(Self {
            file,
            shift,
            blocks,
            dirty: false,
        })
    }

    fn extend_to(&mut self, block: u32) {
        while (self.blocks.len() as u32) < block {
            let count = self.blocks.len() as u32;
            if let Some(last) = self.blocks.last_mut() {
                last.set_header(count as i32);
            }
            self.blocks.push(XrfBlock::new_last(count + 1));
        }
    }
}

impl XrfStore for MemoryXrf {
    fn read(&mut self, mfn: u32) -> MstResult<XrfEntry> {
        let (block, slot) = locate(mfn)?;
        let word = self
            .blocks
            .get(block as usize - 1)
            .map(|b| b.slot(slot))
            .unwrap_or(0);
        Ok(XrfEntry::unpack(word, self.shift))
    }

    fn write(&mut self, mfn: u32, entry: XrfEntry) -> MstResult<()> {
        let (block, slot) = locate(mfn)?;
        let word = entry.pack(self.shift)?;
        self.extend_to(block);
        self.blocks[block as usize - 1].set_slot(slot, word);
        if slot as u32 == SLOTS_PER_BLOCK {
            self.extend_to(block + 1);
        }
        self.dirty = true;
        Ok(())
    }

    fn flush(&mut self) -> MstResult<()> {
        if self.dirty {
            self.file.write_all_blocks(&self.blocks)?;
            self.dirty = false;
        }
        self.file.sync()
    }

    fn shift(&self) -> u8 {
        self.shift
    }

    fn block_count(&self) -> u32 {
        self.blocks.len() as u32
    }
}
