pub mod directory;
pub mod disk;
pub mod page;

pub use directory::{DirectoryEntry, PageDirectory, PageStatus};
pub use disk::{Deserializer, DiskManager, DiskScheduler, Serializer};
pub use page::{Page, TuplePage, TuplePageRef};
