use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::buffer::BufferPool;
use crate::common::{Locator, PageId, Result, SdbError, StorageConfig, INDEX_FILE_EXTENSION};
use crate::index::BTreeIndex;
use crate::storage::disk::DiskManager;
use crate::storage::page::{TuplePage, TuplePageRef, MAX_TUPLE_SIZE};
use crate::tuple::Tuple;

/// StorageEngine ties the buffer pool, the page directory it owns, and a set of
/// named B-tree indexes into one handle over a data directory.
///
/// Rows are encoded tuples appended to tuple pages; each index maps a
/// fixed-width key to the row's locator. Pages are append-only, so replacing
/// or deleting a row only updates the index.
pub struct StorageEngine {
    config: StorageConfig,
    buffer_pool: BufferPool,
    indexes: BTreeMap<String, BTreeIndex>,
    /// Page receiving new rows, if one has room
    insert_page: Option<PageId>,
    closed: bool,
}

impl StorageEngine {
    /// Opens the data directory, loading the page directory and every index
    /// file, or initializes an empty database there.
    pub fn open(config: StorageConfig) -> Result<Self> {
        let disk_manager = Arc::new(DiskManager::new(&config.data_dir)?);
        let buffer_pool = BufferPool::new(config.buffer_pool_size, Arc::clone(&disk_manager))?;

        let mut indexes = BTreeMap::new();
        for file in disk_manager.list_files(INDEX_FILE_EXTENSION)? {
            let name = file
                .strip_suffix(&format!(".{}", INDEX_FILE_EXTENSION))
                .unwrap_or(&file)
                .to_string();
            let index: BTreeIndex = disk_manager.load(&file)?;
            debug!("loaded index {} ({} keys)", name, index.len());
            indexes.insert(name, index);
        }

        info!(
            "opened storage at {} with {} pages and {} indexes",
            config.data_dir.display(),
            buffer_pool.with_directory(|d| d.len()),
            indexes.len()
        );

        Ok(Self {
            config,
            buffer_pool,
            indexes,
            insert_page: None,
            closed: false,
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.buffer_pool
    }

    /// Creates an empty index and writes its file.
    pub fn create_index(&mut self, name: &str, key_width: usize) -> Result<()> {
        check_index_name(name)?;
        if self.indexes.contains_key(name) {
            return Err(SdbError::IndexAlreadyExists(name.to_string()));
        }

        let index = BTreeIndex::with_order(key_width, self.config.btree_order)?;
        self.disk_manager().persist(&index_file(name), &index)?;
        self.indexes.insert(name.to_string(), index);
        info!("create index {} (key width {})", name, key_width);
        Ok(())
    }

    /// Removes an index and its file. Rows it pointed at stay in their pages.
    pub fn drop_index(&mut self, name: &str) -> Result<()> {
        if self.indexes.remove(name).is_none() {
            return Err(SdbError::IndexNotFound(name.to_string()));
        }
        self.disk_manager().remove(&index_file(name))?;
        info!("drop index {}", name);
        Ok(())
    }

    pub fn index(&self, name: &str) -> Result<&BTreeIndex> {
        self.indexes
            .get(name)
            .ok_or_else(|| SdbError::IndexNotFound(name.to_string()))
    }

    /// Index names in ascending order
    pub fn index_names(&self) -> Vec<&str> {
        self.indexes.keys().map(String::as_str).collect()
    }

    /// Stores `tuple` and points `key` in the named index at it, replacing any
    /// row the key referenced before.
    pub fn insert_row(&mut self, index: &str, key: &[u8], tuple: &Tuple) -> Result<Locator> {
        let key_width = self.index(index)?.key_width();
        if key.len() != key_width {
            return Err(SdbError::InvalidKeyLength {
                expected: key_width,
                actual: key.len(),
            });
        }

        let bytes = tuple.encode();
        let locator = self.append_tuple(&bytes)?;

        let index = self
            .indexes
            .get_mut(index)
            .ok_or_else(|| SdbError::IndexNotFound(index.to_string()))?;
        if let Some(previous) = index.insert(key, locator)? {
            debug!("row at {} replaced by {}", previous, locator);
        }
        Ok(locator)
    }

    /// Reads the row the named index maps `key` to.
    pub fn get_row(&self, index: &str, key: &[u8]) -> Result<Option<Tuple>> {
        let locator = match self.index(index)?.lookup(key)? {
            Some(locator) => locator,
            None => return Ok(None),
        };

        let guard = self.buffer_pool.fetch(locator.page_id)?;
        let bytes = TuplePageRef::new(guard.page()).get(locator.offset)?;
        Tuple::decode(bytes).map(Some)
    }

    /// Removes `key` from the named index. Returns whether it was present.
    pub fn delete_row(&mut self, index: &str, key: &[u8]) -> Result<bool> {
        self.indexes
            .get_mut(index)
            .ok_or_else(|| SdbError::IndexNotFound(index.to_string()))?
            .delete(key)
    }

    /// Writes dirty pages, the page directory, and every index to disk.
    pub fn flush(&self) -> Result<()> {
        let pages = self.buffer_pool.flush_all()?;
        self.buffer_pool.persist_directory()?;
        for (name, index) in &self.indexes {
            self.disk_manager().persist(&index_file(name), index)?;
        }
        debug!("flushed {} pages and {} indexes", pages, self.indexes.len());
        Ok(())
    }

    /// Flushes everything and closes the engine.
    pub fn shutdown(mut self) -> Result<()> {
        self.flush()?;
        self.closed = true;
        info!("storage at {} shut down", self.config.data_dir.display());
        Ok(())
    }

    fn disk_manager(&self) -> &Arc<DiskManager> {
        self.buffer_pool.disk_manager()
    }

    /// Appends an encoded tuple to the current insert page, starting a new page
    /// when it is full.
    fn append_tuple(&mut self, bytes: &[u8]) -> Result<Locator> {
        if bytes.len() > MAX_TUPLE_SIZE {
            return Err(SdbError::PageOverflow {
                tuple_size: bytes.len(),
                available: MAX_TUPLE_SIZE,
            });
        }

        if let Some(page_id) = self.insert_page {
            let mut guard = self.buffer_pool.fetch(page_id)?;
            if TuplePageRef::new(guard.page()).free_space()? >= bytes.len() {
                let offset = TuplePage::new(guard.page_mut()).insert(bytes)?;
                return Ok(Locator::new(page_id, offset));
            }
        }

        let page_id = self.buffer_pool.new_page()?;
        let mut guard = self.buffer_pool.fetch(page_id)?;
        let mut page = TuplePage::new(guard.page_mut());
        page.init();
        let offset = page.insert(bytes)?;
        drop(guard);

        debug!("rows now go to {}", page_id);
        self.insert_page = Some(page_id);
        Ok(Locator::new(page_id, offset))
    }
}

impl Drop for StorageEngine {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.flush() {
                warn!("storage engine dropped without a clean flush: {}", e);
            }
        }
    }
}

fn index_file(name: &str) -> String {
    format!("{}.{}", name, INDEX_FILE_EXTENSION)
}

fn check_index_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(SdbError::InvalidIndexName(name.to_string()))
    }
}
