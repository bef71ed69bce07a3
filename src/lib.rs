//! sdb - the storage core of a small relational database
//!
//! This crate owns everything below the SQL front end: the on-disk page format,
//! the page cache with eviction, the binary row encoding and persisted B-tree
//! indexes. Every page is a fixed `PAGE_SIZE` block stored in its own file and
//! resolved through a persisted page directory.
//!
//! # Architecture
//!
//! - **Tuple codec** (`tuple`): tag-prefixed, self-describing row encoding
//!   - `Value`: typed column value (`Int32`, `Byte64`)
//!   - `Tuple`: ordered values with `encode`/`decode`
//!
//! - **Storage layer** (`storage`): pages, page files, and the page directory
//!   - `Page`: fixed-size byte block with bounds-checked range access
//!   - `TuplePage`: appends encoded tuples to a page, addressed by byte offset
//!   - `PageDirectory`: page id -> location map persisted as JSON
//!   - `DiskManager`: page files and whole-object files in the data directory
//!   - `DiskScheduler`: background worker thread performing all page I/O
//!
//! - **Buffer pool** (`buffer`): bounded page cache
//!   - `LruCache`: generic O(1) LRU cache with an eviction listener
//!   - `BufferPool`: fetches pages through the directory, flushes dirty pages
//!     when they are evicted
//!   - `PageGuard`: RAII handle to a resident page
//!
//! - **Index** (`index`): in-memory B+tree over fixed-width byte keys,
//!   serialized whole to one file per index
//!
//! - **Engine** (`engine`): `StorageEngine` wires the above into named indexes
//!   over rows
//!
//! # Example
//!
//! ```rust,no_run
//! use sdb::common::StorageConfig;
//! use sdb::engine::StorageEngine;
//! use sdb::tuple::Tuple;
//!
//! let mut engine = StorageEngine::open(StorageConfig::new("./db")).unwrap();
//! engine.create_index("users", 4).unwrap();
//!
//! let row = Tuple::builder().value(42).value([0u8; 64]).build().unwrap();
//! let key = 42u32.to_be_bytes();
//! engine.insert_row("users", &key, &row).unwrap();
//!
//! assert_eq!(engine.get_row("users", &key).unwrap(), Some(row));
//! engine.shutdown().unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod engine;
pub mod index;
pub mod storage;
pub mod tuple;

// Re-export commonly used types at the crate root
pub use common::{Locator, PageId, Result, SdbError};
