use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind as IoErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use log::debug;

use crate::common::{Location, Result, SdbError, PAGE_SIZE};
use crate::storage::page::Page;

/// Something that can be written out as one whole file.
pub trait Serializer {
    fn serialize(&self) -> Result<Vec<u8>>;
}

/// Something that can be rebuilt from the bytes of one whole file.
pub trait Deserializer: Sized {
    fn deserialize(bytes: &[u8]) -> Result<Self>;
}

/// Writes `bytes` to a sibling temp file and renames it over `path`, so readers
/// see either the old or the new content, never a torn write.
pub(crate) fn write_file_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// DiskManager is responsible for reading and writing files inside the data directory:
/// one file per page, plus whole-object files such as index files.
pub struct DiskManager {
    /// Directory holding every database file
    data_dir: PathBuf,
    /// Number of page reads performed
    num_reads: AtomicU32,
    /// Number of page writes performed
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Creates a new DiskManager rooted at `data_dir`, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        fs::create_dir_all(&data_dir)?;
        Ok(Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    /// Returns the full path of a file inside the data directory.
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    /// Reads the page stored at `location`.
    ///
    /// Fails with `FileNotFound` if the file does not exist and with `Corrupt`
    /// if fewer than `PAGE_SIZE` bytes are available at the offset.
    pub fn read_page(&self, location: &Location) -> Result<Page> {
        let path = self.path_of(&location.file);
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                return Err(SdbError::FileNotFound(path))
            }
            Err(e) => return Err(e.into()),
        };
        file.seek(SeekFrom::Start(location.offset))?;

        let mut data = vec![0u8; PAGE_SIZE];
        match file.read_exact(&mut data) {
            Ok(()) => {}
            Err(e) if e.kind() == IoErrorKind::UnexpectedEof => {
                return Err(SdbError::corrupt(format!(
                    "page file {} holds fewer than {} bytes at {}",
                    path.display(),
                    PAGE_SIZE,
                    location.offset
                )))
            }
            Err(e) => return Err(e.into()),
        }

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Page::new(data)
    }

    /// Writes a page to `location`, creating the file if it does not exist.
    pub fn write_page(&self, location: &Location, page: &Page) -> Result<()> {
        let path = self.path_of(&location.file);
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        file.seek(SeekFrom::Start(location.offset))?;
        file.write_all(page.data())?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Atomically writes a whole object to the file `name`.
    pub fn persist<S: Serializer + ?Sized>(&self, name: &str, object: &S) -> Result<()> {
        let path = self.path_of(name);
        write_file_atomic(&path, &object.serialize()?)?;
        debug!("persisted {}", path.display());
        Ok(())
    }

    /// Loads a whole object from the file `name`.
    pub fn load<D: Deserializer>(&self, name: &str) -> Result<D> {
        let path = self.path_of(name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                return Err(SdbError::FileNotFound(path))
            }
            Err(e) => return Err(e.into()),
        };
        D::deserialize(&bytes)
    }

    /// Deletes the file `name`. Deleting a missing file is not an error.
    pub fn remove(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.path_of(name)) {
            Err(e) if e.kind() != IoErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Names of the files in the data directory carrying the given extension, sorted.
    pub fn list_files(&self, extension: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().map_or(false, |ext| ext == extension) {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Returns the number of page reads performed.
    pub fn get_num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    /// Returns the number of page writes performed.
    pub fn get_num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PageId;
    use tempfile::TempDir;

    struct Blob(Vec<u8>);

    impl Serializer for Blob {
        fn serialize(&self) -> Result<Vec<u8>> {
            Ok(self.0.clone())
        }
    }

    impl Deserializer for Blob {
        fn deserialize(bytes: &[u8]) -> Result<Self> {
            Ok(Blob(bytes.to_vec()))
        }
    }

    #[test]
    fn test_disk_manager_read_write() {
        let dir = TempDir::new().unwrap();
        let dm = DiskManager::new(dir.path()).unwrap();
        let location = Location::for_page(PageId::new(0));

        let mut page = Page::zeroed();
        page.write(0, &[42]).unwrap();
        page.write(PAGE_SIZE - 1, &[128]).unwrap();
        dm.write_page(&location, &page).unwrap();

        let read = dm.read_page(&location).unwrap();
        assert_eq!(read, page);
        assert_eq!(dm.get_num_reads(), 1);
        assert_eq!(dm.get_num_writes(), 1);
    }

    #[test]
    fn test_missing_page_file() {
        let dir = TempDir::new().unwrap();
        let dm = DiskManager::new(dir.path()).unwrap();
        let err = dm.read_page(&Location::for_page(PageId::new(9))).unwrap_err();
        assert!(matches!(err, SdbError::FileNotFound(_)));
    }

    #[test]
    fn test_short_page_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let dm = DiskManager::new(dir.path()).unwrap();
        let location = Location::for_page(PageId::new(1));
        fs::write(dm.path_of(&location.file), vec![1u8; PAGE_SIZE - 1]).unwrap();

        assert!(dm.read_page(&location).unwrap_err().is_corrupt());
    }

    #[test]
    fn test_persist_and_load_object() {
        let dir = TempDir::new().unwrap();
        let dm = DiskManager::new(dir.path()).unwrap();

        dm.persist("blob.idx", &Blob(vec![1, 2, 3])).unwrap();
        let loaded: Blob = dm.load("blob.idx").unwrap();
        assert_eq!(loaded.0, vec![1, 2, 3]);
        assert_eq!(dm.list_files("idx").unwrap(), vec!["blob.idx".to_string()]);
        assert!(!dm.path_of("blob.idx.tmp").exists());

        dm.remove("blob.idx").unwrap();
        dm.remove("blob.idx").unwrap();
        assert!(matches!(
            dm.load::<Blob>("blob.idx"),
            Err(SdbError::FileNotFound(_))
        ));
    }
}
