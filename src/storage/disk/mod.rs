mod disk_manager;
mod disk_scheduler;

pub(crate) use disk_manager::write_file_atomic;
pub use disk_manager::{Deserializer, DiskManager, Serializer};
pub use disk_scheduler::{DiskRequest, DiskScheduler};
