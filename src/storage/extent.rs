//! Extent store for blob content.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs;
use uuid::Uuid;

use super::persist::write_atomic;
use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::models::ExtentChunk;

/// Trait for extent (blob content) storage operations.
///
/// Extents are immutable: an overwrite writes a new extent and releases the
/// old one once no record points at it.
#[async_trait]
pub trait ExtentStore: Send + Sync {
    /// Writes data to the extent store and returns an ExtentChunk reference.
    async fn write(&self, data: Bytes) -> StorageResult<ExtentChunk>;

    /// Reads data from the extent store.
    async fn read(&self, chunk: &ExtentChunk) -> StorageResult<Bytes>;

    /// Deletes an extent from the store. Deleting a missing extent is a no-op.
    async fn delete(&self, extent_id: &str) -> StorageResult<()>;

    /// Returns the ids of every stored extent.
    async fn list_ids(&self) -> Vec<String>;

    /// Returns the total size of all extents.
    async fn total_size(&self) -> u64;
}

/// Number of shards for the extent store (must be power of 2).
const NUM_SHARDS: usize = 64;

/// Sharded in-memory implementation of the extent store.
/// Uses multiple DashMaps to reduce lock contention.
pub struct MemoryExtentStore {
    /// Sharded extents - each shard handles a subset of extent IDs.
    shards: Vec<DashMap<Arc<str>, Bytes>>,
    /// Current total size in bytes.
    current_size: AtomicU64,
}

impl MemoryExtentStore {
    pub fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| DashMap::new()).collect(),
            current_size: AtomicU64::new(0),
        }
    }

    /// Get the shard for a given extent ID.
    #[inline]
    fn get_shard(&self, extent_id: &str) -> &DashMap<Arc<str>, Bytes> {
        let hash = extent_id
            .bytes()
            .take(8)
            .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
        &self.shards[hash % NUM_SHARDS]
    }
}

impl Default for MemoryExtentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExtentStore for MemoryExtentStore {
    async fn write(&self, data: Bytes) -> StorageResult<ExtentChunk> {
        let size = data.len() as u64;
        let extent_id = Uuid::new_v4().to_string();
        let shard = self.get_shard(&extent_id);
        shard.insert(Arc::from(extent_id.as_str()), data);
        self.current_size.fetch_add(size, Ordering::Relaxed);

        Ok(ExtentChunk::new(extent_id, 0, size))
    }

    async fn read(&self, chunk: &ExtentChunk) -> StorageResult<Bytes> {
        let shard = self.get_shard(&chunk.id);
        let extent = shard.get(chunk.id.as_str()).ok_or_else(|| {
            StorageError::with_message(
                ErrorCode::InternalError,
                format!("Extent {} is missing", chunk.id),
            )
        })?;

        let start = chunk.offset as usize;
        let end = start + chunk.count as usize;
        if end > extent.len() {
            return Err(StorageError::with_message(
                ErrorCode::InternalError,
                format!("Extent {} is shorter than its reference", chunk.id),
            ));
        }

        Ok(extent.slice(start..end))
    }

    async fn delete(&self, extent_id: &str) -> StorageResult<()> {
        let shard = self.get_shard(extent_id);
        if let Some((_, data)) = shard.remove(extent_id) {
            self.current_size
                .fetch_sub(data.len() as u64, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn list_ids(&self) -> Vec<String> {
        self.shards
            .iter()
            .flat_map(|shard| {
                shard
                    .iter()
                    .map(|entry| entry.key().to_string())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    async fn total_size(&self) -> u64 {
        self.current_size.load(Ordering::Relaxed)
    }
}

/// File system implementation of the extent store. Each extent is one file
/// named by its id.
pub struct FsExtentStore {
    /// Base directory for extent files.
    base_path: PathBuf,
    /// Sizes of the extents on disk.
    extent_sizes: DashMap<Arc<str>, u64>,
    /// Current total size in bytes.
    current_size: AtomicU64,
}

impl FsExtentStore {
    /// Opens the store, creating the directory if needed and indexing the
    /// extents already on disk.
    pub async fn open(base_path: PathBuf) -> StorageResult<Self> {
        fs::create_dir_all(&base_path)
            .await
            .map_err(|e| StorageError::io("Failed to create extent directory", e))?;

        let store = Self {
            base_path,
            extent_sizes: DashMap::new(),
            current_size: AtomicU64::new(0),
        };

        let mut entries = fs::read_dir(&store.base_path)
            .await
            .map_err(|e| StorageError::io("Failed to scan extent directory", e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io("Failed to scan extent directory", e))?
        {
            let file_name = entry.file_name().to_string_lossy().to_string();
            // Leftovers of interrupted writes.
            if file_name.ends_with(".tmp") {
                fs::remove_file(entry.path()).await.ok();
                continue;
            }
            let size = entry
                .metadata()
                .await
                .map_err(|e| StorageError::io("Failed to stat extent", e))?
                .len();
            store.extent_sizes.insert(Arc::from(file_name.as_str()), size);
            store.current_size.fetch_add(size, Ordering::Relaxed);
        }

        Ok(store)
    }

    fn extent_path(&self, extent_id: &str) -> PathBuf {
        self.base_path.join(extent_id)
    }
}

#[async_trait]
impl ExtentStore for FsExtentStore {
    async fn write(&self, data: Bytes) -> StorageResult<ExtentChunk> {
        let size = data.len() as u64;
        let extent_id = Uuid::new_v4().to_string();

        write_atomic(&self.extent_path(&extent_id), &data).await?;

        self.extent_sizes.insert(Arc::from(extent_id.as_str()), size);
        self.current_size.fetch_add(size, Ordering::Relaxed);

        Ok(ExtentChunk::new(extent_id, 0, size))
    }

    async fn read(&self, chunk: &ExtentChunk) -> StorageResult<Bytes> {
        let data = fs::read(self.extent_path(&chunk.id))
            .await
            .map_err(|e| StorageError::io("Failed to read extent file", e))?;

        let start = chunk.offset as usize;
        let end = start + chunk.count as usize;
        if end > data.len() {
            return Err(StorageError::with_message(
                ErrorCode::InternalError,
                format!("Extent {} is shorter than its reference", chunk.id),
            ));
        }

        Ok(Bytes::from(data).slice(start..end))
    }

    async fn delete(&self, extent_id: &str) -> StorageResult<()> {
        if let Some((_, size)) = self.extent_sizes.remove(extent_id) {
            self.current_size.fetch_sub(size, Ordering::Relaxed);
        }

        match fs::remove_file(self.extent_path(extent_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io("Failed to remove extent file", e)),
        }
    }

    async fn list_ids(&self) -> Vec<String> {
        self.extent_sizes
            .iter()
            .map(|entry| entry.key().to_string())
            .collect()
    }

    async fn total_size(&self) -> u64 {
        self.current_size.load(Ordering::Relaxed)
    }
}
