//! Two-phase container teardown.
//!
//! Deleting a container first marks it `Deleting` and persists that state,
//! which stops new writes. The blobs are then purged one by one from a
//! snapshot of the container's name index, repeating until the index is
//! empty. Finally the container is marked `Deleted` and its record removed.
//! A teardown interrupted at any point can be resumed by deleting the
//! container again, or by [`BlobService::resume_pending_deletes`] on open.

use tracing::{debug, info, warn};

use super::{commit, BlobService};
use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::models::{ContainerModel, ContainerState};
use crate::trigger::BlobEvent;

impl BlobService {
    /// Deletes a container and every blob in it, returning the final
    /// `Deleted` model.
    pub async fn delete_container(&self, name: &str) -> StorageResult<ContainerModel> {
        self.timed("delete_container", self.teardown(name)).await
    }

    /// Finishes every teardown left in `Deleting` state. Returns the number
    /// of containers finalized.
    pub async fn resume_pending_deletes(&self) -> StorageResult<usize> {
        let pending: Vec<String> = self
            .metadata()
            .list_containers()
            .await?
            .into_iter()
            .filter(|c| c.state == ContainerState::Deleting)
            .map(|c| c.name)
            .collect();

        let mut finalized = 0;
        for name in pending {
            info!("Resuming deletion of container {}", name);
            match self.delete_container(&name).await {
                Ok(_) => finalized += 1,
                Err(e) if e.code == ErrorCode::ContainerNotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(finalized)
    }

    async fn teardown(&self, name: &str) -> StorageResult<ContainerModel> {
        {
            let gate = self.locks().exclusive(name).await;
            let mut container = self.metadata().get_container(name).await?;
            match container.state {
                ContainerState::Active => {
                    container.state = ContainerState::Deleting;
                    container.properties.update_etag();
                    let service = self.clone();
                    commit(async move {
                        let _gate = gate;
                        service.metadata().update_container(container).await
                    })
                    .await?;
                    info!("Deleting container {}", name);
                }
                ContainerState::Deleting => debug!("Container {} already deleting", name),
                ContainerState::Deleted => {
                    return Err(StorageError::new(ErrorCode::ContainerNotFound))
                }
            }
        }

        loop {
            self.purge_blobs(name).await?;

            let gate = self.locks().exclusive(name).await;
            // Another teardown may have finalized the container meanwhile.
            let mut container = self.metadata().get_container(name).await?;
            if container.state == ContainerState::Deleted {
                return Err(StorageError::new(ErrorCode::ContainerNotFound));
            }
            if !self.metadata().blob_names(name).await.is_empty() {
                continue;
            }

            container.state = ContainerState::Deleted;
            container.properties.update_etag();
            let service = self.clone();
            return commit(async move {
                let _gate = gate;
                service.metadata().delete_container(&container.name).await?;

                info!("Deleted container {}", container.name);
                service.emit(BlobEvent::ContainerDeleted {
                    container: container.name.clone(),
                });
                Ok(container)
            })
            .await;
        }
    }

    /// Removes every blob currently indexed under `name`.
    async fn purge_blobs(&self, name: &str) -> StorageResult<()> {
        let names = self.metadata().blob_names(name).await;
        if names.is_empty() {
            return Ok(());
        }

        debug!("Purging {} blobs from {}", names.len(), name);
        for blob in &names {
            // Vanished blobs were removed by someone else; that is success.
            if let Err(e) = self.remove_blob(name, blob).await {
                warn!("Failed to purge {}/{}: {}", name, blob, e);
                return Err(e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;

    #[tokio::test]
    async fn test_delete_purges_and_frees_name() {
        let service = BlobService::in_memory();
        service.create_container("doomed").await.unwrap();
        for i in 0..10 {
            service
                .put_blob("doomed", &format!("blob-{}", i), "data", Metadata::new())
                .await
                .unwrap();
        }

        let deleted = service.delete_container("doomed").await.unwrap();
        assert_eq!(deleted.state, ContainerState::Deleted);
        assert_eq!(service.stored_bytes().await, 0);

        let err = service.get_container("doomed").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ContainerNotFound);

        let again = service.create_container("doomed").await.unwrap();
        assert_ne!(again.incarnation, deleted.incarnation);
        assert!(!service.blob_exists("doomed", "blob-0").await.unwrap());
    }

    #[tokio::test]
    async fn test_deleting_container_resumes() {
        let service = BlobService::in_memory();
        let mut model = service.create_container("halfway").await.unwrap();
        service
            .put_blob("halfway", "left-behind", "x", Metadata::new())
            .await
            .unwrap();

        model.state = ContainerState::Deleting;
        service.metadata().update_container(model).await.unwrap();

        let err = service
            .put_blob("halfway", "late", "x", Metadata::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ContainerBeingDeleted);

        assert_eq!(service.resume_pending_deletes().await.unwrap(), 1);
        assert!(service.list_containers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_container() {
        let service = BlobService::in_memory();
        let err = service.delete_container("absent").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ContainerNotFound);
        assert!(!service.delete_container_if_exists("absent").await.unwrap());
    }
}
