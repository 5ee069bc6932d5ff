//! Container data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{new_etag, AccessPolicy};
use crate::error::{ErrorCode, StorageError, StorageResult};

/// Lifecycle state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ContainerState {
    #[default]
    Active,
    Deleting,
    Deleted,
}

impl ContainerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerState::Active => "active",
            ContainerState::Deleting => "deleting",
            ContainerState::Deleted => "deleted",
        }
    }
}

/// Container properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerProperties {
    pub etag: String,
    pub created_on: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl Default for ContainerProperties {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            etag: new_etag(),
            created_on: now,
            last_modified: now,
        }
    }
}

impl ContainerProperties {
    /// Updates the ETag and last modified time.
    pub fn update_etag(&mut self) {
        self.etag = new_etag();
        self.last_modified = Utc::now();
    }
}

/// Complete container model stored in the metadata store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerModel {
    /// Container name.
    pub name: String,
    /// Lifecycle state.
    pub state: ContainerState,
    /// Identifies this particular creation of the name.
    pub incarnation: String,
    /// Creation order, assigned by the metadata store.
    pub sequence: u64,
    /// Container properties.
    pub properties: ContainerProperties,
    /// Stored access policies, in the order they were set.
    pub policies: Vec<AccessPolicy>,
}

impl ContainerModel {
    /// Creates a new active container model.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ContainerState::Active,
            incarnation: uuid::Uuid::new_v4().simple().to_string(),
            sequence: 0,
            properties: ContainerProperties::default(),
            policies: Vec::new(),
        }
    }

    /// Fails unless the container accepts new writes.
    pub fn ensure_writable(&self) -> StorageResult<()> {
        match self.state {
            ContainerState::Active => Ok(()),
            ContainerState::Deleting => Err(StorageError::new(ErrorCode::ContainerBeingDeleted)),
            ContainerState::Deleted => Err(StorageError::new(ErrorCode::ContainerNotFound)),
        }
    }
}

/// Validates a container name: 3-63 characters of lowercase letters, digits
/// and single hyphens, starting and ending with a letter or digit.
pub fn validate_container_name(name: &str) -> StorageResult<()> {
    if name.len() < 3 || name.len() > 63 {
        return Err(StorageError::with_message(
            ErrorCode::InvalidResourceName,
            "Container name must be between 3 and 63 characters",
        ));
    }

    let starts_ok = name
        .chars()
        .next()
        .map(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .unwrap_or(false);
    if !starts_ok {
        return Err(StorageError::with_message(
            ErrorCode::InvalidResourceName,
            "Container name must start with a letter or number",
        ));
    }

    for c in name.chars() {
        if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
            return Err(StorageError::with_message(
                ErrorCode::InvalidResourceName,
                "Container name can only contain lowercase letters, numbers, and hyphens",
            ));
        }
    }

    if name.contains("--") || name.ends_with('-') {
        return Err(StorageError::with_message(
            ErrorCode::InvalidResourceName,
            "Container name cannot have consecutive or trailing hyphens",
        ));
    }

    Ok(())
}
