use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use log::trace;

use crate::common::{Location, Result, SdbError};
use crate::storage::page::Page;

use super::DiskManager;

/// Represents a disk I/O request. Each request carries its own reply channel,
/// so the submitter gets back the exact outcome of its read or write.
pub enum DiskRequest {
    Read {
        location: Location,
        reply: Sender<Result<Page>>,
    },
    Write {
        location: Location,
        page: Page,
        reply: Sender<Result<()>>,
    },
}

/// DiskScheduler manages a background worker thread that performs all page I/O.
///
/// Requests are processed one at a time in submission order. The `*_sync`
/// helpers block the caller until the worker answers.
pub struct DiskScheduler {
    /// The disk manager for actual I/O operations
    disk_manager: Arc<DiskManager>,
    /// Channel sender for queuing requests (taken on drop to stop the worker)
    request_sender: Option<Sender<DiskRequest>>,
    /// Handle to the background worker thread
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a new DiskScheduler with the given DiskManager.
    /// Spawns a background worker thread to process requests.
    pub fn new(disk_manager: Arc<DiskManager>) -> Result<Self> {
        let (sender, receiver) = bounded::<DiskRequest>(128);

        let dm_clone = Arc::clone(&disk_manager);
        let worker_handle = thread::Builder::new()
            .name("sdb-disk-io".to_string())
            .spawn(move || Self::run_worker(dm_clone, receiver))?;

        Ok(Self {
            disk_manager,
            request_sender: Some(sender),
            worker_handle: Some(worker_handle),
        })
    }

    /// Returns the underlying disk manager.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    /// Queues a request for the background worker.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        let sender = self
            .request_sender
            .as_ref()
            .ok_or_else(|| SdbError::DiskScheduler("scheduler is shut down".to_string()))?;
        sender
            .send(request)
            .map_err(|e| SdbError::DiskScheduler(format!("Failed to schedule request: {}", e)))
    }

    /// Schedules a page read and waits for the page.
    pub fn read_sync(&self, location: &Location) -> Result<Page> {
        let (tx, rx) = bounded(1);
        self.schedule(DiskRequest::Read {
            location: location.clone(),
            reply: tx,
        })?;
        rx.recv().map_err(|e| {
            SdbError::DiskScheduler(format!("Failed to receive completion: {}", e))
        })?
    }

    /// Schedules a page write and waits for it to complete.
    pub fn write_sync(&self, location: &Location, page: &Page) -> Result<()> {
        let (tx, rx) = bounded(1);
        self.schedule(DiskRequest::Write {
            location: location.clone(),
            page: page.clone(),
            reply: tx,
        })?;
        rx.recv().map_err(|e| {
            SdbError::DiskScheduler(format!("Failed to receive completion: {}", e))
        })?
    }

    fn run_worker(disk_manager: Arc<DiskManager>, receiver: Receiver<DiskRequest>) {
        // recv fails once every sender is gone
        while let Ok(request) = receiver.recv() {
            match request {
                DiskRequest::Read { location, reply } => {
                    trace!("disk worker: read {}", location);
                    let _ = reply.send(disk_manager.read_page(&location));
                }
                DiskRequest::Write {
                    location,
                    page,
                    reply,
                } => {
                    trace!("disk worker: write {}", location);
                    let _ = reply.send(disk_manager.write_page(&location, &page));
                }
            }
        }
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.request_sender.take();
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PageId;
    use tempfile::TempDir;

    fn create_scheduler() -> (DiskScheduler, TempDir) {
        let dir = TempDir::new().unwrap();
        let dm = Arc::new(DiskManager::new(dir.path()).unwrap());
        (DiskScheduler::new(dm).unwrap(), dir)
    }

    #[test]
    fn test_scheduler_write_then_read() {
        let (scheduler, _dir) = create_scheduler();
        let location = Location::for_page(PageId::new(3));

        let mut page = Page::zeroed();
        page.write(10, b"scheduled").unwrap();
        scheduler.write_sync(&location, &page).unwrap();

        let read = scheduler.read_sync(&location).unwrap();
        assert_eq!(read.read(10, 9).unwrap(), b"scheduled");
        assert_eq!(scheduler.disk_manager().get_num_writes(), 1);
    }

    #[test]
    fn test_scheduler_propagates_errors() {
        let (scheduler, _dir) = create_scheduler();
        let err = scheduler
            .read_sync(&Location::for_page(PageId::new(1)))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_scheduler_from_many_threads() {
        let (scheduler, _dir) = create_scheduler();
        let scheduler = Arc::new(scheduler);

        let handles: Vec<_> = (0..4u32)
            .map(|t| {
                let scheduler = Arc::clone(&scheduler);
                thread::spawn(move || {
                    let location = Location::for_page(PageId::new(t));
                    let mut page = Page::zeroed();
                    page.write(0, &[t as u8]).unwrap();
                    scheduler.write_sync(&location, &page).unwrap();
                    scheduler.read_sync(&location).unwrap().data()[0]
                })
            })
            .collect();

        for (t, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), t as u8);
        }
    }
}
