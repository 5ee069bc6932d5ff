//! Metadata store for containers and blobs.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::{BTreeSet, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::models::{BlobModel, ContainerModel};

/// Trait for metadata storage operations.
///
/// Implementations only keep records; state checks (for example rejecting
/// uploads into a container that is being deleted) belong to the service.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    // Container operations

    /// Inserts a new container, assigning its creation sequence.
    async fn create_container(&self, container: ContainerModel) -> StorageResult<ContainerModel>;
    async fn get_container(&self, name: &str) -> StorageResult<ContainerModel>;
    async fn update_container(&self, container: ContainerModel) -> StorageResult<()>;
    /// Removes the container record and its blob index.
    async fn delete_container(&self, name: &str) -> StorageResult<()>;
    /// Returns every container record in creation order.
    async fn list_containers(&self) -> StorageResult<Vec<ContainerModel>>;

    // Blob operations

    /// Inserts or replaces a blob, returning the replaced record.
    async fn put_blob(&self, blob: BlobModel) -> StorageResult<Option<BlobModel>>;
    async fn get_blob(&self, container: &str, name: &str) -> StorageResult<BlobModel>;
    /// Removes a blob, returning the removed record if it existed.
    async fn delete_blob(&self, container: &str, name: &str) -> StorageResult<Option<BlobModel>>;
    /// Snapshot of the blob-name index of a container, sorted.
    async fn blob_names(&self, container: &str) -> Vec<String>;
    /// Up to `limit` names under `prefix`, in order, starting from `from`.
    async fn list_blob_names(
        &self,
        container: &str,
        prefix: &str,
        from: Bound<&str>,
        limit: usize,
    ) -> Vec<String>;

    /// Extent ids referenced by any blob record.
    async fn referenced_extents(&self) -> HashSet<String>;
}

/// Key type for containers - uses Arc<str> to avoid allocations.
type ContainerKey = Arc<str>;

/// Key type for blobs: (container, name).
type BlobKey = (Arc<str>, Arc<str>);

/// In-memory implementation of the metadata store with concurrent access.
pub struct MemoryMetadataStore {
    /// Containers indexed by name.
    containers: DashMap<ContainerKey, ContainerModel>,

    /// Blobs indexed by (container, name).
    blobs: DashMap<BlobKey, BlobModel>,

    /// Secondary index: container -> sorted set of blob names.
    blob_index: DashMap<ContainerKey, BTreeSet<Arc<str>>>,

    /// Next container creation sequence.
    next_sequence: AtomicU64,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self {
            containers: DashMap::new(),
            blobs: DashMap::new(),
            blob_index: DashMap::new(),
            next_sequence: AtomicU64::new(1),
        }
    }

    /// Create an Arc<str> key from a string slice.
    #[inline]
    fn arc_str(s: &str) -> Arc<str> {
        Arc::from(s)
    }

    /// Create a blob key.
    #[inline]
    fn blob_key(container: &str, name: &str) -> BlobKey {
        (Self::arc_str(container), Self::arc_str(name))
    }

    /// Inserts a container record as-is, keeping its sequence. Used when
    /// loading persisted state.
    pub(crate) fn restore_container(&self, container: ContainerModel) {
        self.next_sequence
            .fetch_max(container.sequence + 1, Ordering::SeqCst);
        self.containers
            .insert(Self::arc_str(&container.name), container);
    }

    /// Inserts a blob record as-is. Used when loading persisted state.
    pub(crate) fn restore_blob(&self, blob: BlobModel) {
        self.index_blob(&blob.container, &blob.name);
        self.blobs
            .insert(Self::blob_key(&blob.container, &blob.name), blob);
    }

    fn index_blob(&self, container: &str, name: &str) {
        self.blob_index
            .entry(Self::arc_str(container))
            .or_default()
            .insert(Self::arc_str(name));
    }
}

impl Default for MemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn create_container(
        &self,
        mut container: ContainerModel,
    ) -> StorageResult<ContainerModel> {
        match self.containers.entry(Self::arc_str(&container.name)) {
            Entry::Occupied(_) => Err(StorageError::new(ErrorCode::ContainerAlreadyExists)),
            Entry::Vacant(slot) => {
                container.sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
                slot.insert(container.clone());
                Ok(container)
            }
        }
    }

    async fn get_container(&self, name: &str) -> StorageResult<ContainerModel> {
        self.containers
            .get(name)
            .map(|c| c.value().clone())
            .ok_or_else(|| StorageError::new(ErrorCode::ContainerNotFound))
    }

    async fn update_container(&self, container: ContainerModel) -> StorageResult<()> {
        match self.containers.get_mut(container.name.as_str()) {
            Some(mut entry) => {
                *entry = container;
                Ok(())
            }
            None => Err(StorageError::new(ErrorCode::ContainerNotFound)),
        }
    }

    async fn delete_container(&self, name: &str) -> StorageResult<()> {
        if let Some((_, names)) = self.blob_index.remove(name) {
            for blob in names {
                self.blobs.remove(&(Self::arc_str(name), blob));
            }
        }
        self.containers
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::new(ErrorCode::ContainerNotFound))
    }

    async fn list_containers(&self) -> StorageResult<Vec<ContainerModel>> {
        let mut containers: Vec<ContainerModel> = self
            .containers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        containers.sort_by_key(|c| c.sequence);
        Ok(containers)
    }

    async fn put_blob(&self, blob: BlobModel) -> StorageResult<Option<BlobModel>> {
        self.index_blob(&blob.container, &blob.name);
        let key = Self::blob_key(&blob.container, &blob.name);
        Ok(self.blobs.insert(key, blob))
    }

    async fn get_blob(&self, container: &str, name: &str) -> StorageResult<BlobModel> {
        self.blobs
            .get(&Self::blob_key(container, name))
            .map(|b| b.value().clone())
            .ok_or_else(|| StorageError::new(ErrorCode::BlobNotFound))
    }

    async fn delete_blob(&self, container: &str, name: &str) -> StorageResult<Option<BlobModel>> {
        let removed = self.blobs.remove(&Self::blob_key(container, name));
        if let Some(mut entry) = self.blob_index.get_mut(container) {
            entry.remove(name);
        }
        Ok(removed.map(|(_, blob)| blob))
    }

    async fn blob_names(&self, container: &str) -> Vec<String> {
        self.blob_index
            .get(container)
            .map(|names| names.iter().map(|n| n.to_string()).collect())
            .unwrap_or_default()
    }

    async fn list_blob_names(
        &self,
        container: &str,
        prefix: &str,
        from: Bound<&str>,
        limit: usize,
    ) -> Vec<String> {
        let lower = match from {
            Bound::Included(key) if key >= prefix => Bound::Included(key),
            Bound::Excluded(key) if key >= prefix => Bound::Excluded(key),
            _ => Bound::Included(prefix),
        };

        self.blob_index
            .get(container)
            .map(|index| {
                index
                    .range::<str, _>((lower, Bound::Unbounded))
                    .take_while(|name| name.starts_with(prefix))
                    .take(limit)
                    .map(|name| name.to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn referenced_extents(&self) -> HashSet<String> {
        self.blobs
            .iter()
            .map(|entry| entry.value().extent.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BlobProperties, ExtentChunk, Metadata};

    async fn store_with(names: &[&str]) -> MemoryMetadataStore {
        let store = MemoryMetadataStore::new();
        store.create_container(ContainerModel::new("index")).await.unwrap();
        for name in names {
            store
                .put_blob(BlobModel {
                    container: "index".to_string(),
                    name: name.to_string(),
                    properties: BlobProperties::for_content(b"x", None),
                    metadata: Metadata::new(),
                    extent: ExtentChunk::new(format!("extent-{}", name), 0, 1),
                })
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_list_blob_names_stops_at_limit() {
        let store = store_with(&["a/1", "a/2", "a/3", "b/1", "c"]).await;

        let names = store
            .list_blob_names("index", "", Bound::Unbounded, 2)
            .await;
        assert_eq!(names, vec!["a/1", "a/2"]);

        let names = store
            .list_blob_names("index", "a/", Bound::Excluded("a/1"), 10)
            .await;
        assert_eq!(names, vec!["a/2", "a/3"]);

        let names = store
            .list_blob_names("index", "", Bound::Included("b"), 10)
            .await;
        assert_eq!(names, vec!["b/1", "c"]);

        // A start before the prefix is clamped to it.
        let names = store
            .list_blob_names("index", "b/", Bound::Excluded("a/3"), 10)
            .await;
        assert_eq!(names, vec!["b/1"]);

        assert!(store
            .list_blob_names("missing", "", Bound::Unbounded, 10)
            .await
            .is_empty());
    }
}
