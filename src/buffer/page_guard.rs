use std::ops::Deref;

use parking_lot::MappedMutexGuard;

use crate::common::PageId;
use crate::storage::page::Page;

use super::PageDescriptor;

/// RAII handle to a resident page returned by `BufferPool::fetch`.
///
/// The guard holds the pool lock, so the descriptor cannot be evicted or
/// aliased while it is alive. Drop it before calling back into the pool.
pub struct PageGuard<'a> {
    descriptor: MappedMutexGuard<'a, PageDescriptor>,
}

impl<'a> PageGuard<'a> {
    pub(crate) fn new(descriptor: MappedMutexGuard<'a, PageDescriptor>) -> Self {
        Self { descriptor }
    }

    pub fn page_id(&self) -> PageId {
        self.descriptor.page_id()
    }

    /// Returns a reference to the page.
    pub fn page(&self) -> &Page {
        self.descriptor.page()
    }

    /// Returns a mutable reference to the page.
    /// Automatically marks the page as dirty.
    pub fn page_mut(&mut self) -> &mut Page {
        self.descriptor.page_mut()
    }

    pub fn is_dirty(&self) -> bool {
        self.descriptor.is_dirty()
    }
}

impl Deref for PageGuard<'_> {
    type Target = PageDescriptor;

    fn deref(&self) -> &Self::Target {
        &self.descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Location;
    use parking_lot::{Mutex, MutexGuard};

    #[test]
    fn test_page_guard_marks_dirty_on_write() {
        let id = PageId::new(1);
        let slot = Mutex::new(Some(PageDescriptor::new(
            id,
            Location::for_page(id),
            Page::zeroed(),
        )));

        {
            let mapped = MutexGuard::try_map(slot.lock(), |d| d.as_mut()).ok().unwrap();
            let mut guard = PageGuard::new(mapped);
            assert_eq!(guard.page_id(), id);
            assert!(!guard.is_dirty());

            guard.page_mut().write(0, &[42]).unwrap();
            assert!(guard.is_dirty());
            assert_eq!(guard.location().offset, 0);
        }

        // lock released with the guard
        let desc = slot.lock();
        let desc = desc.as_ref().unwrap();
        assert!(desc.is_dirty());
        assert_eq!(desc.page().data()[0], 42);
    }
}
