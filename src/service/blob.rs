//! Blob store operations.
//!
//! Mutations run in two steps. The preparation (container checks, content
//! upload, lock acquisition) runs under the operation timeout; abandoning it
//! leaves the previous value in place and at most an orphan extent for the
//! garbage collector. The record swap then runs to completion on its own
//! task while still holding the locks taken during preparation.

use bytes::Bytes;
use tokio::sync::OwnedRwLockWriteGuard;
use tracing::debug;

use super::{commit, BlobService};
use crate::error::{ErrorCode, StorageResult};
use crate::models::{
    validate_blob_name, BlobDownload, BlobModel, BlobProperties, Metadata, PutOptions,
};
use crate::trigger::BlobEvent;

impl BlobService {
    /// Uploads a blob, replacing any existing blob of that name, and returns
    /// its new ETag.
    pub async fn put_blob(
        &self,
        container: &str,
        name: &str,
        content: impl Into<Bytes>,
        metadata: Metadata,
    ) -> StorageResult<String> {
        self.put_blob_with_options(container, name, content, PutOptions::with_metadata(metadata))
            .await
    }

    /// Uploads a blob with explicit options.
    pub async fn put_blob_with_options(
        &self,
        container: &str,
        name: &str,
        content: impl Into<Bytes>,
        options: PutOptions,
    ) -> StorageResult<String> {
        validate_blob_name(name)?;
        options.metadata.validate()?;
        let content = content.into();

        let (gate, key, blob) = self
            .timed("put_blob", async {
                // Held shared until the swap so the container cannot start
                // deleting underneath the upload.
                let gate = self.locks().shared(container).await;
                self.existing_container(container).await?.ensure_writable()?;

                let mut properties =
                    BlobProperties::for_content(&content, options.content_type.as_deref());
                let extent = self.extents().write(content).await?;

                let key = self.locks().blob(container, name).clone().write_owned().await;
                match self.metadata().get_blob(container, name).await {
                    Ok(previous) => properties.created_on = previous.properties.created_on,
                    Err(e) if e.code == ErrorCode::BlobNotFound => {}
                    Err(e) => {
                        self.release_extent(&extent.id).await;
                        return Err(e);
                    }
                }

                let blob = BlobModel {
                    container: container.to_string(),
                    name: name.to_string(),
                    properties,
                    metadata: options.metadata,
                    extent,
                };
                Ok((gate, key, blob))
            })
            .await?;

        let service = self.clone();
        commit(async move {
            let _locks = (key, gate);
            service.store_blob(blob).await
        })
        .await
    }

    /// Swaps a new blob record in and releases the content it replaced.
    async fn store_blob(&self, blob: BlobModel) -> StorageResult<String> {
        let container = blob.container.clone();
        let name = blob.name.clone();
        let etag = blob.properties.etag.clone();
        let length = blob.properties.content_length;
        let extent_id = blob.extent.id.clone();

        match self.metadata().put_blob(blob).await {
            Ok(Some(replaced)) => self.release_extent(&replaced.extent.id).await,
            Ok(None) => {}
            Err(e) => {
                self.release_extent(&extent_id).await;
                return Err(e);
            }
        }

        debug!("Stored blob {}/{} ({} bytes, {})", container, name, length, etag);
        self.emit(BlobEvent::BlobCreated {
            container,
            name,
            etag: etag.clone(),
            length,
        });
        Ok(etag)
    }

    /// Downloads a blob's content, metadata and ETag. Blobs of a container
    /// being deleted stay readable until purged.
    pub async fn get_blob(&self, container: &str, name: &str) -> StorageResult<BlobDownload> {
        self.timed("get_blob", async {
            self.existing_container(container).await?;

            let _key = self.locks().blob(container, name).read().await;
            let blob = self.metadata().get_blob(container, name).await?;
            let content = self.extents().read(&blob.extent).await?;

            Ok(BlobDownload {
                content,
                etag: blob.properties.etag.clone(),
                metadata: blob.metadata,
                properties: blob.properties,
            })
        })
        .await
    }

    /// Returns a blob's record without its content.
    pub async fn get_blob_properties(
        &self,
        container: &str,
        name: &str,
    ) -> StorageResult<BlobModel> {
        self.timed("get_blob_properties", async {
            self.existing_container(container).await?;
            let _key = self.locks().blob(container, name).read().await;
            self.metadata().get_blob(container, name).await
        })
        .await
    }

    /// Whether a blob exists. Fails only when the container does not.
    pub async fn blob_exists(&self, container: &str, name: &str) -> StorageResult<bool> {
        match self.get_blob_properties(container, name).await {
            Ok(_) => Ok(true),
            Err(e) if e.code == ErrorCode::BlobNotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Replaces a blob's metadata, leaving its content untouched, and
    /// returns the new ETag.
    pub async fn set_blob_metadata(
        &self,
        container: &str,
        name: &str,
        metadata: Metadata,
    ) -> StorageResult<String> {
        metadata.validate()?;

        let (gate, key, blob) = self
            .timed("set_blob_metadata", async {
                let gate = self.locks().shared(container).await;
                self.existing_container(container).await?.ensure_writable()?;

                let key = self.locks().blob(container, name).clone().write_owned().await;
                let mut blob = self.metadata().get_blob(container, name).await?;
                blob.metadata = metadata;
                blob.properties.update_etag();
                Ok((gate, key, blob))
            })
            .await?;

        let service = self.clone();
        commit(async move {
            let _locks = (key, gate);
            let etag = blob.properties.etag.clone();
            debug!("Updating metadata of {}/{} ({})", blob.container, blob.name, etag);
            // Same extent as before, so nothing is released.
            service.metadata().put_blob(blob).await?;
            Ok(etag)
        })
        .await
    }

    /// Deletes a blob. Returns whether it existed.
    pub async fn delete_blob(&self, container: &str, name: &str) -> StorageResult<bool> {
        let key = self
            .timed("delete_blob", async {
                self.existing_container(container).await?;
                Ok(self.locks().blob(container, name).clone().write_owned().await)
            })
            .await?;

        Ok(self.remove_locked(key, container, name).await?.is_some())
    }

    /// Removes a blob under its key lock, releasing its content.
    pub(super) async fn remove_blob(
        &self,
        container: &str,
        name: &str,
    ) -> StorageResult<Option<BlobModel>> {
        let key = self.locks().blob(container, name).clone().write_owned().await;
        self.remove_locked(key, container, name).await
    }

    async fn remove_locked(
        &self,
        key: OwnedRwLockWriteGuard<()>,
        container: &str,
        name: &str,
    ) -> StorageResult<Option<BlobModel>> {
        let service = self.clone();
        let container = container.to_string();
        let name = name.to_string();

        commit(async move {
            let _key = key;
            let removed = service.metadata().delete_blob(&container, &name).await?;

            if let Some(blob) = &removed {
                service.release_extent(&blob.extent.id).await;
                debug!("Deleted blob {}/{}", container, name);
                service.emit(BlobEvent::BlobDeleted { container, name });
            }
            Ok(removed)
        })
        .await
    }
}
