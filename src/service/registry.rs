//! Container registry operations.

use tracing::{debug, info};

use super::{commit, BlobService};
use crate::error::{ErrorCode, StorageResult};
use crate::models::{validate_container_name, ContainerModel, ContainerState};
use crate::trigger::BlobEvent;

/// Attempts `create_container_if_not_exists` makes when the existing
/// container disappears between the collision and the lookup.
const CREATE_IF_NOT_EXISTS_ATTEMPTS: usize = 3;

impl BlobService {
    /// Creates a container. Fails with `ContainerAlreadyExists` while a
    /// container of that name is active or still being deleted.
    pub async fn create_container(&self, name: &str) -> StorageResult<ContainerModel> {
        validate_container_name(name)?;
        let service = self.clone();
        let model = ContainerModel::new(name);
        commit(async move {
            let created = service.metadata().create_container(model).await?;
            info!("Created container {}", created.name);
            service.emit(BlobEvent::ContainerCreated {
                container: created.name.clone(),
            });
            Ok(created)
        })
        .await
    }

    /// Creates a container unless one of that name exists, in which case the
    /// existing container is returned. The flag tells whether it was created.
    pub async fn create_container_if_not_exists(
        &self,
        name: &str,
    ) -> StorageResult<(ContainerModel, bool)> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.create_container(name).await {
                Ok(container) => return Ok((container, true)),
                Err(e) if e.code != ErrorCode::ContainerAlreadyExists => return Err(e),
                Err(e) => match self.get_container(name).await {
                    Ok(existing) => return Ok((existing, false)),
                    // Finalized between the two calls; the name is free again.
                    Err(lookup)
                        if lookup.code == ErrorCode::ContainerNotFound
                            && attempt < CREATE_IF_NOT_EXISTS_ATTEMPTS =>
                    {
                        debug!("Container {} vanished during create-if-not-exists", name);
                    }
                    Err(_) => return Err(e),
                },
            }
        }
    }

    /// Returns a container that has not been finalized.
    pub async fn get_container(&self, name: &str) -> StorageResult<ContainerModel> {
        self.timed("get_container", self.existing_container(name))
            .await
    }

    /// Lists every container not yet finalized, in creation order.
    pub async fn list_containers(&self) -> StorageResult<Vec<ContainerModel>> {
        self.timed("list_containers", async {
            let containers = self.metadata().list_containers().await?;
            Ok(containers
                .into_iter()
                .filter(|c| c.state != ContainerState::Deleted)
                .collect())
        })
        .await
    }

    /// Deletes a container if it exists. Returns whether it existed.
    pub async fn delete_container_if_exists(&self, name: &str) -> StorageResult<bool> {
        match self.delete_container(name).await {
            Ok(_) => Ok(true),
            Err(e) if e.code == ErrorCode::ContainerNotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Deletes every container. Containers removed concurrently are skipped.
    /// Returns the number of containers this call deleted.
    pub async fn delete_all_containers(&self) -> StorageResult<usize> {
        let mut deleted = 0;
        for container in self.list_containers().await? {
            if self.delete_container_if_exists(&container.name).await? {
                deleted += 1;
            }
        }
        info!("Deleted {} containers", deleted);
        Ok(deleted)
    }
}
