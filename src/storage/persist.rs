//! Write-through file persistence for the metadata store.
//!
//! Records are kept as JSON documents:
//!
//! ```text
//! <root>/containers/<container>.json
//! <root>/blobs/<container>/<sha256(blob name)>.json
//! ```
//!
//! Every document is replaced with the atomic-swap pattern (unique temp
//! file, fsync, rename), so a crash leaves either the old or the new
//! version on disk. The in-memory store in front answers all reads.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{MemoryMetadataStore, MetadataStore};
use crate::error::{StorageError, StorageResult};
use crate::models::{BlobModel, ContainerModel};

/// Writes `data` to `path` so that readers never observe a partial file.
pub(crate) async fn write_atomic(path: &Path, data: &[u8]) -> StorageResult<()> {
    let tmp = path.with_file_name(format!(
        "{}.{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        Uuid::new_v4().simple()
    ));

    let result = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, path).await
    }
    .await;

    if let Err(e) = result {
        fs::remove_file(&tmp).await.ok();
        return Err(StorageError::io(
            &format!("Failed to write {}", path.display()),
            e,
        ));
    }
    Ok(())
}

async fn remove_if_present(path: &Path) -> StorageResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::io(
            &format!("Failed to remove {}", path.display()),
            e,
        )),
    }
}

/// Reads every `*.json` document in `dir`, skipping and cleaning up
/// leftovers of interrupted writes.
async fn read_documents<T: DeserializeOwned>(dir: &Path) -> StorageResult<Vec<T>> {
    let mut documents = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(documents),
        Err(e) => return Err(StorageError::io("Failed to scan metadata directory", e)),
    };

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StorageError::io("Failed to scan metadata directory", e))?
    {
        let path = entry.path();
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => {}
            Some("tmp") => {
                fs::remove_file(&path).await.ok();
                continue;
            }
            _ => continue,
        }

        let raw = fs::read(&path)
            .await
            .map_err(|e| StorageError::io("Failed to read metadata document", e))?;
        match serde_json::from_slice(&raw) {
            Ok(doc) => documents.push(doc),
            Err(e) => warn!("Skipping unreadable metadata document {}: {}", path.display(), e),
        }
    }

    Ok(documents)
}

fn to_json<T: Serialize>(value: &T) -> StorageResult<Vec<u8>> {
    serde_json::to_vec_pretty(value).map_err(|e| {
        StorageError::with_message(
            crate::error::ErrorCode::InternalError,
            format!("Failed to encode metadata: {}", e),
        )
    })
}

/// Metadata store persisting every record under a root directory.
pub struct FsMetadataStore {
    root: PathBuf,
    inner: MemoryMetadataStore,
}

impl FsMetadataStore {
    /// Opens the store, loading every persisted record.
    pub async fn open(root: PathBuf) -> StorageResult<Self> {
        let store = Self {
            root,
            inner: MemoryMetadataStore::new(),
        };

        fs::create_dir_all(store.containers_dir())
            .await
            .map_err(|e| StorageError::io("Failed to create metadata directory", e))?;
        fs::create_dir_all(store.root.join("blobs"))
            .await
            .map_err(|e| StorageError::io("Failed to create metadata directory", e))?;

        let containers: Vec<ContainerModel> = read_documents(&store.containers_dir()).await?;
        for container in containers {
            let blobs: Vec<BlobModel> =
                read_documents(&store.container_blobs_dir(&container.name)).await?;
            debug!(
                "Loaded container {} ({} blobs, {})",
                container.name,
                blobs.len(),
                container.state.as_str()
            );
            for blob in blobs {
                store.inner.restore_blob(blob);
            }
            store.inner.restore_container(container);
        }

        Ok(store)
    }

    fn containers_dir(&self) -> PathBuf {
        self.root.join("containers")
    }

    fn container_path(&self, name: &str) -> PathBuf {
        self.containers_dir().join(format!("{}.json", name))
    }

    fn container_blobs_dir(&self, container: &str) -> PathBuf {
        self.root.join("blobs").join(container)
    }

    fn blob_path(&self, container: &str, name: &str) -> PathBuf {
        let digest = Sha256::digest(name.as_bytes());
        self.container_blobs_dir(container)
            .join(format!("{:x}.json", digest))
    }
}

#[async_trait]
impl MetadataStore for FsMetadataStore {
    async fn create_container(&self, container: ContainerModel) -> StorageResult<ContainerModel> {
        let created = self.inner.create_container(container).await?;
        let written = async {
            fs::create_dir_all(self.container_blobs_dir(&created.name))
                .await
                .map_err(|e| StorageError::io("Failed to create container directory", e))?;
            write_atomic(&self.container_path(&created.name), &to_json(&created)?).await
        }
        .await;

        if let Err(e) = written {
            self.inner.delete_container(&created.name).await.ok();
            return Err(e);
        }
        Ok(created)
    }

    async fn get_container(&self, name: &str) -> StorageResult<ContainerModel> {
        self.inner.get_container(name).await
    }

    async fn update_container(&self, container: ContainerModel) -> StorageResult<()> {
        // Fail before touching disk when the record is gone.
        self.inner.get_container(&container.name).await?;
        write_atomic(&self.container_path(&container.name), &to_json(&container)?).await?;
        self.inner.update_container(container).await
    }

    async fn delete_container(&self, name: &str) -> StorageResult<()> {
        self.inner.get_container(name).await?;
        remove_if_present(&self.container_path(name)).await?;
        match fs::remove_dir_all(self.container_blobs_dir(name)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::io("Failed to remove container directory", e)),
        }
        self.inner.delete_container(name).await
    }

    async fn list_containers(&self) -> StorageResult<Vec<ContainerModel>> {
        self.inner.list_containers().await
    }

    async fn put_blob(&self, blob: BlobModel) -> StorageResult<Option<BlobModel>> {
        write_atomic(&self.blob_path(&blob.container, &blob.name), &to_json(&blob)?).await?;
        self.inner.put_blob(blob).await
    }

    async fn get_blob(&self, container: &str, name: &str) -> StorageResult<BlobModel> {
        self.inner.get_blob(container, name).await
    }

    async fn delete_blob(&self, container: &str, name: &str) -> StorageResult<Option<BlobModel>> {
        remove_if_present(&self.blob_path(container, name)).await?;
        self.inner.delete_blob(container, name).await
    }

    async fn blob_names(&self, container: &str) -> Vec<String> {
        self.inner.blob_names(container).await
    }

    async fn list_blob_names(
        &self,
        container: &str,
        prefix: &str,
        from: Bound<&str>,
        limit: usize,
    ) -> Vec<String> {
        self.inner.list_blob_names(container, prefix, from, limit).await
    }

    async fn referenced_extents(&self) -> HashSet<String> {
        self.inner.referenced_extents().await
    }
}
