use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::common::{Location, PageId, Result, SdbError};

use super::disk::{write_file_atomic, Deserializer, Serializer};

const DIRECTORY_VERSION: u32 = 1;

/// Allocation state of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    Allocated,
    Free,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub page_id: PageId,
    pub location: Location,
    pub status: PageStatus,
}

/// On-disk shape of the directory file
#[derive(Serialize, Deserialize)]
struct DirectoryFile {
    version: u32,
    next_page_id: u32,
    entries: Vec<DirectoryEntry>,
}

/// Catalog of page locations: maps every page id ever handed out to its backing
/// file and tracks whether it is allocated or waiting for reuse.
///
/// Entries are never removed, only flipped between `Allocated` and `Free`.
/// Persisted as a JSON record set so it can be inspected by hand.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageDirectory {
    next_page_id: u32,
    entries: BTreeMap<PageId, DirectoryEntry>,
    free_pages: BTreeSet<PageId>,
}

impl PageDirectory {
    /// Creates an empty directory for a new database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves an allocated page id to its storage location.
    pub fn lookup(&self, page_id: PageId) -> Option<&Location> {
        self.entries
            .get(&page_id)
            .filter(|entry| entry.status == PageStatus::Allocated)
            .map(|entry| &entry.location)
    }

    pub fn is_allocated(&self, page_id: PageId) -> bool {
        self.lookup(page_id).is_some()
    }

    /// Hands out a page id, reusing the lowest freed id if there is one.
    /// A live (allocated) id is never returned.
    pub fn allocate(&mut self) -> Result<PageId> {
        let page_id = match self.free_pages.iter().next().copied() {
            Some(page_id) => {
                self.free_pages.remove(&page_id);
                page_id
            }
            None => {
                if self.next_page_id == u32::MAX {
                    return Err(SdbError::corrupt("page id space exhausted"));
                }
                let page_id = PageId::new(self.next_page_id);
                self.next_page_id += 1;
                page_id
            }
        };

        self.entries.insert(
            page_id,
            DirectoryEntry {
                page_id,
                location: Location::for_page(page_id),
                status: PageStatus::Allocated,
            },
        );
        debug!("page directory: allocated {}", page_id);
        Ok(page_id)
    }

    /// Returns an allocated page id to the reuse pool.
    pub fn free(&mut self, page_id: PageId) -> Result<()> {
        match self.entries.get_mut(&page_id) {
            Some(entry) if entry.status == PageStatus::Allocated => {
                entry.status = PageStatus::Free;
                self.free_pages.insert(page_id);
                debug!("page directory: freed {}", page_id);
                Ok(())
            }
            _ => Err(SdbError::PageNotFound(page_id)),
        }
    }

    /// Number of allocated pages
    pub fn len(&self) -> usize {
        self.entries.len() - self.free_pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn free_count(&self) -> usize {
        self.free_pages.len()
    }

    /// All entries, allocated and free, in page id order.
    pub fn entries(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.entries.values()
    }

    /// Loads the directory from `path`.
    ///
    /// A missing file yields `DirectoryNotFound` and malformed content yields
    /// `Corrupt`. Any other read failure is an I/O error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                return Err(SdbError::DirectoryNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        let directory = Self::deserialize(&bytes)?;
        info!(
            "loaded page directory {} ({} allocated, {} free)",
            path.display(),
            directory.len(),
            directory.free_count()
        );
        Ok(directory)
    }

    /// Loads the directory, or starts a new one if the file does not exist yet.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        match Self::load(path.as_ref()) {
            Err(SdbError::DirectoryNotFound(_)) => {
                info!("no page directory at {}, starting a new database", path.as_ref().display());
                Ok(Self::new())
            }
            other => other,
        }
    }

    /// Atomically writes the directory to `path`.
    pub fn persist<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_file_atomic(path.as_ref(), &self.serialize()?)?;
        debug!("persisted page directory to {}", path.as_ref().display());
        Ok(())
    }
}

impl Serializer for PageDirectory {
    fn serialize(&self) -> Result<Vec<u8>> {
        let file = DirectoryFile {
            version: DIRECTORY_VERSION,
            next_page_id: self.next_page_id,
            entries: self.entries.values().cloned().collect(),
        };
        serde_json::to_vec_pretty(&file)
            .map_err(|e| SdbError::corrupt(format!("page directory: {}", e)))
    }
}

impl Deserializer for PageDirectory {
    fn deserialize(bytes: &[u8]) -> Result<Self> {
        let file: DirectoryFile = serde_json::from_slice(bytes)
            .map_err(|e| SdbError::corrupt(format!("page directory: {}", e)))?;

        if file.version != DIRECTORY_VERSION {
            return Err(SdbError::corrupt(format!(
                "page directory: unsupported version {}",
                file.version
            )));
        }

        let mut directory = PageDirectory {
            next_page_id: file.next_page_id,
            ..Default::default()
        };
        for entry in file.entries {
            let page_id = entry.page_id;
            if page_id.as_u32() >= file.next_page_id {
                return Err(SdbError::corrupt(format!(
                    "page directory: {} was never allocated (next id {})",
                    page_id, file.next_page_id
                )));
            }
            if entry.status == PageStatus::Free {
                directory.free_pages.insert(page_id);
            }
            if directory.entries.insert(page_id, entry).is_some() {
                return Err(SdbError::corrupt(format!(
                    "page directory: duplicate entry for {}",
                    page_id
                )));
            }
        }
        Ok(directory)
    }
}
