use crate::common::{Location, PageId};
use crate::storage::page::Page;

/// PageDescriptor is the cache-resident wrapper around a page: it owns the page
/// bytes and remembers where they came from and whether they changed.
#[derive(Debug)]
pub struct PageDescriptor {
    page_id: PageId,
    /// Resolved storage location, used to write the page back
    location: Location,
    page: Page,
    /// Whether the page has been modified since it was read or last flushed
    dirty: bool,
}

impl PageDescriptor {
    pub fn new(page_id: PageId, location: Location, page: Page) -> Self {
        Self {
            page_id,
            location,
            page,
            dirty: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Returns the page for mutation and marks the descriptor dirty.
    pub fn page_mut(&mut self) -> &mut Page {
        self.dirty = true;
        &mut self.page
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_dirty_tracking() {
        let id = PageId::new(4);
        let mut desc = PageDescriptor::new(id, Location::for_page(id), Page::zeroed());
        assert!(!desc.is_dirty());

        let _ = desc.page();
        assert!(!desc.is_dirty());

        desc.page_mut().write(0, &[1]).unwrap();
        assert!(desc.is_dirty());
        assert_eq!(desc.page().data()[0], 1);

        desc.clear_dirty();
        assert!(!desc.is_dirty());
        assert_eq!(desc.location().file, "0000000004.db");
    }
}
