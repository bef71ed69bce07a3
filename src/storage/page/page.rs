use std::fmt;

use crate::common::{Result, SdbError, PAGE_SIZE};

/// A fixed-size block of `PAGE_SIZE` bytes: the unit of disk I/O.
///
/// The page never changes length; mutation only overwrites byte ranges in place.
/// What the bytes mean is up to the layer that interprets them (see `TuplePage`).
#[derive(Clone, PartialEq, Eq)]
pub struct Page {
    data: Box<[u8]>,
}

impl Page {
    /// Wraps a raw buffer read from disk. The buffer must be exactly `PAGE_SIZE` bytes.
    pub fn new(data: Vec<u8>) -> Result<Self> {
        if data.len() != PAGE_SIZE {
            return Err(SdbError::InvalidPageLength {
                expected: PAGE_SIZE,
                actual: data.len(),
            });
        }
        Ok(Self {
            data: data.into_boxed_slice(),
        })
    }

    /// Copies the given slice into a new page.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        Self::new(data.to_vec())
    }

    /// Creates a zero-filled page for a new allocation.
    pub fn zeroed() -> Self {
        Self {
            data: vec![0u8; PAGE_SIZE].into_boxed_slice(),
        }
    }

    /// Returns the raw page bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the raw page bytes for in-place mutation.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Reads `len` bytes starting at `offset`.
    pub fn read(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let range = Self::checked_range(offset, len)?;
        Ok(&self.data[range])
    }

    /// Overwrites the bytes starting at `offset` with `bytes`.
    pub fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let range = Self::checked_range(offset, bytes.len())?;
        self.data[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Zeroes the whole page.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    fn checked_range(offset: usize, len: usize) -> Result<std::ops::Range<usize>> {
        match offset.checked_add(len) {
            Some(end) if end <= PAGE_SIZE => Ok(offset..end),
            _ => Err(SdbError::OutOfBounds { offset, len }),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let used = self.data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        f.debug_struct("Page")
            .field("size", &self.data.len())
            .field("used", &used)
            .finish()
    }
}
