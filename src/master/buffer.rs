//! Record I/O buffer owned by one open handle.

/// Grows on demand to the largest record seen; never shrinks.
#[derive(Debug, Default)]
pub struct RecordBuffer {
    data: Vec<u8>,
}

impl RecordBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
        }
    }

    /// A slice of exactly `len` bytes, resizing first if needed.
    pub fn slice_mut(&mut self, len: usize) -> &mut [u8] {
        if self.data.len() < len {
            self.data.resize(len, 0);
        }
        &mut self.data[..len]
    }

    pub fn slice(&self, len: usize) -> &[u8] {
        &self.data[..len.min(self.data.len())]
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }
}
