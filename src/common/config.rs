use std::path::{Path, PathBuf};

/// Size of a page in bytes (4 KB). Every page file holds exactly this many bytes.
pub const PAGE_SIZE: usize = 4096;

/// Default buffer pool size (number of cached page descriptors)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 64;

/// Default B+ tree order (max keys per node)
pub const DEFAULT_BTREE_ORDER: usize = 64;

/// Smallest order that still allows a node to split into two non-empty halves
pub const MIN_BTREE_ORDER: usize = 3;

/// Width of the fixed-size blob column kind
pub const BYTE64_LEN: usize = 64;

/// File name of the persisted page directory inside the data directory
pub const PAGE_DIRECTORY_FILE: &str = "__page_directory.db";

/// Extension of per-page files
pub const PAGE_FILE_EXTENSION: &str = "db";

/// Extension of per-index files
pub const INDEX_FILE_EXTENSION: &str = "idx";

/// Default location of the database files
pub const DEFAULT_DATA_DIR: &str = "./db";

/// Runtime configuration for a storage engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub buffer_pool_size: usize,
    pub btree_order: usize,
}

impl StorageConfig {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn with_buffer_pool_size(mut self, size: usize) -> Self {
        self.buffer_pool_size = size;
        self
    }

    pub fn with_btree_order(mut self, order: usize) -> Self {
        self.btree_order = order;
        self
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            buffer_pool_size: DEFAULT_BUFFER_POOL_SIZE,
            btree_order: DEFAULT_BTREE_ORDER,
        }
    }
}
