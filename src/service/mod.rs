//! The blob service: an explicit handle over the metadata and extent stores.
//!
//! Every operation is an async method on [`BlobService`]. The handle is cheap
//! to clone and independent instances share nothing, so tests can run
//! against isolated in-memory stores.
//!
//! # Example
//!
//! ```no_run
//! use blobstore_rs::{BlobService, Metadata};
//!
//! # async fn example() -> blobstore_rs::StorageResult<()> {
//! let service = BlobService::in_memory();
//! service.create_container("quickstartblobs").await?;
//! let etag = service
//!     .put_blob("quickstartblobs", "hello.txt", "Hello, World!", Metadata::new())
//!     .await?;
//! let download = service.get_blob("quickstartblobs", "hello.txt").await?;
//! assert_eq!(download.etag, etag);
//! # Ok(())
//! # }
//! ```

mod blob;
mod lifecycle;
mod listing;
mod locks;
mod policy;
mod registry;

pub use listing::*;

use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;

use crate::config::Config;
use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::models::{ContainerModel, ContainerState};
use crate::storage::{
    ExtentStore, FsExtentStore, FsMetadataStore, GarbageCollector, MemoryExtentStore,
    MemoryMetadataStore, MetadataStore,
};
use crate::trigger::BlobEvent;

use locks::LockTable;

/// Capacity of the event channel; slow subscribers observe a lag.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Handle to a blob store.
#[derive(Clone)]
pub struct BlobService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    config: Arc<Config>,
    metadata: Arc<dyn MetadataStore>,
    extents: Arc<dyn ExtentStore>,
    locks: LockTable,
    events: broadcast::Sender<BlobEvent>,
}

impl BlobService {
    /// Creates a service with in-memory storage and default configuration.
    pub fn in_memory() -> Self {
        Self::new(Config::in_memory())
    }

    /// Creates a service with in-memory storage, ignoring `storage_root`.
    pub fn new(config: Config) -> Self {
        Self::with_storage(
            config,
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(MemoryExtentStore::new()),
        )
    }

    /// Creates a service with custom storage.
    pub fn with_storage(
        config: Config,
        metadata: Arc<dyn MetadataStore>,
        extents: Arc<dyn ExtentStore>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(ServiceInner {
                config: Arc::new(config),
                metadata,
                extents,
                locks: LockTable::new(),
                events,
            }),
        }
    }

    /// Opens the storage described by `config` and finishes any container
    /// deletion interrupted by a previous shutdown.
    pub async fn open(config: Config) -> StorageResult<Self> {
        let service = match config.storage_root.clone() {
            Some(root) => {
                let metadata = FsMetadataStore::open(root.join("meta")).await?;
                let extents = FsExtentStore::open(root.join("extents")).await?;
                Self::with_storage(config, Arc::new(metadata), Arc::new(extents))
            }
            None => Self::new(config),
        };

        service.resume_pending_deletes().await?;
        Ok(service)
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Subscribes to container and blob events.
    pub fn subscribe(&self) -> broadcast::Receiver<BlobEvent> {
        self.inner.events.subscribe()
    }

    /// Returns a garbage collector over this service's stores.
    pub fn garbage_collector(&self) -> GarbageCollector {
        GarbageCollector::new(
            self.inner.metadata.clone(),
            self.inner.extents.clone(),
            self.inner.config.gc_interval,
        )
    }

    /// Total bytes held by the extent store.
    pub async fn stored_bytes(&self) -> u64 {
        self.inner.extents.total_size().await
    }

    fn metadata(&self) -> &dyn MetadataStore {
        self.inner.metadata.as_ref()
    }

    fn extents(&self) -> &dyn ExtentStore {
        self.inner.extents.as_ref()
    }

    fn locks(&self) -> &LockTable {
        &self.inner.locks
    }

    fn emit(&self, event: BlobEvent) {
        // An error only means nobody is subscribed.
        let _ = self.inner.events.send(event);
    }

    /// Runs `fut` under the configured operation timeout. When the timeout
    /// elapses the future is dropped before its commit point.
    async fn timed<T, F>(&self, operation: &'static str, fut: F) -> StorageResult<T>
    where
        F: Future<Output = StorageResult<T>>,
    {
        let limit = self.inner.config.operation_timeout;
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!("{} timed out after {:?}", operation, limit);
                Err(StorageError::with_message(
                    ErrorCode::OperationTimedOut,
                    format!("{} did not complete within {:?}", operation, limit),
                ))
            }
        }
    }

    /// Loads a container that has not been finalized.
    async fn existing_container(&self, name: &str) -> StorageResult<ContainerModel> {
        let container = self.metadata().get_container(name).await?;
        if container.state == ContainerState::Deleted {
            return Err(StorageError::new(ErrorCode::ContainerNotFound));
        }
        Ok(container)
    }

    /// Deletes an extent that no record references any more. A failure
    /// leaves an orphan for the garbage collector.
    async fn release_extent(&self, extent_id: &str) {
        if let Err(e) = self.extents().delete(extent_id).await {
            warn!("Failed to release extent {}: {}", extent_id, e);
        }
    }
}

/// Runs a commit step on its own task. The step finishes even when the
/// caller stops waiting for it, so the metadata store is never left between
/// its persisted and in-memory views.
async fn commit<T, F>(step: F) -> StorageResult<T>
where
    F: Future<Output = StorageResult<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(step).await.map_err(|e| {
        StorageError::with_message(ErrorCode::InternalError, format!("Commit task failed: {}", e))
    })?
}
