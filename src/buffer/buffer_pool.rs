use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, trace, warn};
use parking_lot::{Mutex, MutexGuard};

use crate::common::{PageId, Result, SdbError, PAGE_DIRECTORY_FILE};
use crate::storage::directory::PageDirectory;
use crate::storage::disk::{DiskManager, DiskScheduler};
use crate::storage::page::Page;

use super::{EvictionListener, LruCache, PageDescriptor, PageGuard};

/// Writes dirty descriptors back to their location as the cache evicts them.
pub struct FlushOnEvict {
    disk_scheduler: Arc<DiskScheduler>,
}

impl EvictionListener<PageId, PageDescriptor> for FlushOnEvict {
    type Error = SdbError;

    fn on_evict(&mut self, page_id: &PageId, descriptor: &PageDescriptor) -> Result<()> {
        if !descriptor.is_dirty() {
            trace!("evicting clean {}", page_id);
            return Ok(());
        }
        debug!("evicting dirty {}, writing to {}", page_id, descriptor.location());
        self.disk_scheduler
            .write_sync(descriptor.location(), descriptor.page())
            .map_err(|e| {
                warn!("failed to flush {} on eviction: {}", page_id, e);
                e
            })
    }
}

type PageCache = LruCache<PageId, PageDescriptor, FlushOnEvict>;

/// BufferPool caches a bounded number of page descriptors and mediates every
/// page read and write, so callers never touch page files directly.
///
/// All state sits behind one exclusive lock, taken for the duration of each
/// operation and held by every outstanding [`PageGuard`]. Page I/O goes through
/// the [`DiskScheduler`] worker thread.
pub struct BufferPool {
    /// Maximum number of resident descriptors
    capacity: usize,
    /// Resident descriptors, least recently used evicted first
    cache: Mutex<PageCache>,
    /// Page id -> location map; always locked after `cache`
    directory: Mutex<PageDirectory>,
    /// Disk scheduler for page I/O
    disk_scheduler: Arc<DiskScheduler>,
    directory_path: PathBuf,
    closed: AtomicBool,
}

impl BufferPool {
    /// Creates a buffer pool holding at most `capacity` pages, loading the page
    /// directory from the data directory or starting a new one.
    pub fn new(capacity: usize, disk_manager: Arc<DiskManager>) -> Result<Self> {
        if capacity == 0 {
            return Err(SdbError::InvalidCapacity(capacity));
        }

        let directory_path = disk_manager.path_of(PAGE_DIRECTORY_FILE);
        let directory = PageDirectory::load_or_create(&directory_path)?;

        let disk_scheduler = Arc::new(DiskScheduler::new(disk_manager)?);
        let cache = LruCache::with_listener(
            capacity,
            FlushOnEvict {
                disk_scheduler: Arc::clone(&disk_scheduler),
            },
        )?;

        Ok(Self {
            capacity,
            cache: Mutex::new(cache),
            directory: Mutex::new(directory),
            disk_scheduler,
            directory_path,
            closed: AtomicBool::new(false),
        })
    }

    /// Fetches a page, reading it from disk on a cache miss.
    ///
    /// On a miss with a full pool the least recently used page is evicted first,
    /// and written back if dirty. If that write fails the fetch fails and the
    /// victim stays resident.
    pub fn fetch(&self, page_id: PageId) -> Result<PageGuard<'_>> {
        let mut cache = self.cache.lock();

        if !cache.contains(&page_id) {
            let location = self
                .directory
                .lock()
                .lookup(page_id)
                .cloned()
                .ok_or(SdbError::PageNotFound(page_id))?;

            let page = self.disk_scheduler.read_sync(&location)?;
            trace!("read {} from {}", page_id, location);

            if let Some((evicted, _)) =
                cache.put(page_id, PageDescriptor::new(page_id, location, page))?
            {
                debug!("{} evicted to make room for {}", evicted, page_id);
            }
        }

        MutexGuard::try_map(cache, |cache| cache.get_mut(&page_id))
            .map(PageGuard::new)
            .map_err(|_| SdbError::PageNotFound(page_id))
    }

    /// Allocates a new zero-filled page, writes its file, and caches it.
    pub fn new_page(&self) -> Result<PageId> {
        let mut cache = self.cache.lock();

        let (page_id, location) = {
            let mut directory = self.directory.lock();
            let page_id = directory.allocate()?;
            let location = directory
                .lookup(page_id)
                .cloned()
                .ok_or(SdbError::PageNotFound(page_id))?;
            (page_id, location)
        };

        let page = Page::zeroed();
        let cached = self
            .disk_scheduler
            .write_sync(&location, &page)
            .and_then(|_| cache.put(page_id, PageDescriptor::new(page_id, location, page)));

        match cached {
            Ok(evicted) => {
                if let Some((evicted, _)) = evicted {
                    debug!("{} evicted to make room for {}", evicted, page_id);
                }
                debug!("allocated {}", page_id);
                Ok(page_id)
            }
            Err(e) => {
                // give the id back so it is not leaked
                let _ = self.directory.lock().free(page_id);
                Err(e)
            }
        }
    }

    /// Frees a page. Any resident copy is discarded first, so the id never goes
    /// back to the reuse pool while a dirty descriptor still references it.
    pub fn free_page(&self, page_id: PageId) -> Result<()> {
        let mut cache = self.cache.lock();
        let mut directory = self.directory.lock();

        if !directory.is_allocated(page_id) {
            return Err(SdbError::PageNotFound(page_id));
        }
        if let Some(descriptor) = cache.remove(&page_id) {
            debug!(
                "discarding resident {} (dirty: {}) before free",
                page_id,
                descriptor.is_dirty()
            );
        }
        directory.free(page_id)
    }

    /// Writes a dirty page to disk without evicting it.
    /// Returns false if the page is not resident.
    pub fn flush(&self, page_id: PageId) -> Result<bool> {
        let mut cache = self.cache.lock();

        match cache.peek_mut(&page_id) {
            Some(descriptor) => {
                if descriptor.is_dirty() {
                    self.disk_scheduler
                        .write_sync(descriptor.location(), descriptor.page())?;
                    descriptor.clear_dirty();
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Writes every dirty resident page to disk. Returns how many were written.
    pub fn flush_all(&self) -> Result<usize> {
        let mut cache = self.cache.lock();
        let mut written = 0;

        for (_, descriptor) in cache.iter_mut() {
            if descriptor.is_dirty() {
                self.disk_scheduler
                    .write_sync(descriptor.location(), descriptor.page())?;
                descriptor.clear_dirty();
                written += 1;
            }
        }

        Ok(written)
    }

    /// Atomically writes the page directory file.
    pub fn persist_directory(&self) -> Result<()> {
        self.directory.lock().persist(&self.directory_path)
    }

    /// Flushes every dirty page, persists the directory and empties the cache.
    pub fn shutdown(self) -> Result<()> {
        self.close()
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let written = self.flush_all()?;
        self.persist_directory()?;
        self.cache.lock().drain();
        info!("buffer pool shut down, {} dirty pages written", written);
        Ok(())
    }

    /// Returns the pool capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of resident pages
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    pub fn is_resident(&self, page_id: PageId) -> bool {
        self.cache.lock().contains(&page_id)
    }

    /// Dirty state of a resident page, None if not resident.
    pub fn is_dirty(&self, page_id: PageId) -> Option<bool> {
        self.cache.lock().peek(&page_id).map(PageDescriptor::is_dirty)
    }

    /// Resident page ids from most to least recently used.
    pub fn resident_pages(&self) -> Vec<PageId> {
        self.cache.lock().iter().map(|(id, _)| *id).collect()
    }

    /// Runs `f` against the page directory.
    pub fn with_directory<R>(&self, f: impl FnOnce(&PageDirectory) -> R) -> R {
        f(&*self.directory.lock())
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.disk_scheduler.disk_manager()
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("buffer pool dropped with unflushed state: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_pool(capacity: usize) -> (BufferPool, TempDir) {
        let dir = TempDir::new().unwrap();
        let dm = Arc::new(DiskManager::new(dir.path()).unwrap());
        (BufferPool::new(capacity, dm).unwrap(), dir)
    }

    #[test]
    fn test_buffer_pool_new() {
        let (pool, _dir) = create_pool(10);
        assert_eq!(pool.capacity(), 10);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_buffer_pool_zero_capacity() {
        let dir = TempDir::new().unwrap();
        let dm = Arc::new(DiskManager::new(dir.path()).unwrap());
        let err = BufferPool::new(0, dm).err().unwrap();
        assert!(matches!(err, SdbError::InvalidCapacity(0)));
    }

    #[test]
    fn test_buffer_pool_new_page() {
        let (pool, _dir) = create_pool(10);

        let page_id = pool.new_page().unwrap();
        assert_eq!(page_id, PageId::new(0));
        assert!(pool.is_resident(page_id));
        assert_eq!(pool.is_dirty(page_id), Some(false));
        assert!(pool.disk_manager().path_of(&page_id.file_name()).exists());
    }

    #[test]
    fn test_buffer_pool_read_write() {
        let (pool, _dir) = create_pool(10);
        let page_id = pool.new_page().unwrap();

        {
            let mut guard = pool.fetch(page_id).unwrap();
            guard.page_mut().write(0, &[42]).unwrap();
            guard.page_mut().write(100, &[255]).unwrap();
        }
        assert_eq!(pool.is_dirty(page_id), Some(true));

        let guard = pool.fetch(page_id).unwrap();
        assert_eq!(guard.page().data()[0], 42);
        assert_eq!(guard.page().data()[100], 255);
    }

    #[test]
    fn test_buffer_pool_fetch_unknown_page() {
        let (pool, _dir) = create_pool(2);
        let err = pool.fetch(PageId::new(7)).err().unwrap();
        assert!(matches!(err, SdbError::PageNotFound(_)));
    }

    #[test]
    fn test_buffer_pool_flush_keeps_page_resident() {
        let (pool, _dir) = create_pool(10);
        let page_id = pool.new_page().unwrap();
        pool.fetch(page_id).unwrap().page_mut().write(0, &[9]).unwrap();

        assert!(pool.flush(page_id).unwrap());
        assert_eq!(pool.is_dirty(page_id), Some(false));
        assert!(pool.is_resident(page_id));
        assert!(!pool.flush(PageId::new(99)).unwrap());
    }

    #[test]
    fn test_buffer_pool_free_page() {
        let (pool, _dir) = create_pool(4);
        let page_id = pool.new_page().unwrap();
        pool.fetch(page_id).unwrap().page_mut().write(0, &[1]).unwrap();

        pool.free_page(page_id).unwrap();
        assert!(!pool.is_resident(page_id));
        assert!(pool.fetch(page_id).is_err());
        assert!(pool.free_page(page_id).is_err());

        // the id is reused for the next allocation
        assert_eq!(pool.new_page().unwrap(), page_id);
        assert_eq!(pool.fetch(page_id).unwrap().page().data()[0], 0);
    }
}
