use std::fmt;

use serde::{Deserialize, Serialize};

use super::config::PAGE_FILE_EXTENSION;

/// Page identifier type - uniquely identifies a page on disk
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PageId(pub u32);

impl PageId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Name of the file backing this page.
    pub fn file_name(&self) -> String {
        format!("{:010}.{}", self.0, PAGE_FILE_EXTENSION)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageId({})", self.0)
    }
}

/// Where a page lives on disk: a file inside the data directory and a byte offset in it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub offset: u64,
}

impl Location {
    pub fn new(file: impl Into<String>, offset: u64) -> Self {
        Self {
            file: file.into(),
            offset,
        }
    }

    /// The location used for a freshly allocated page.
    pub fn for_page(page_id: PageId) -> Self {
        Self::new(page_id.file_name(), 0)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.file, self.offset)
    }
}

/// Locator - identifies where a tuple resides: page ID and byte offset inside the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Locator {
    pub page_id: PageId,
    pub offset: u32,
}

impl Locator {
    /// Encoded width inside index files
    pub const ENCODED_LEN: usize = 8;

    pub fn new(page_id: PageId, offset: u32) -> Self {
        Self { page_id, offset }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page_id.0, self.offset)
    }
}
