//! Blob data models.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use super::{new_etag, Metadata};
use crate::error::{ErrorCode, StorageError, StorageResult};

/// Maximum length of a blob name.
pub const MAX_BLOB_NAME_LEN: usize = 1024;

/// Default content type for uploaded blobs.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Reference to data stored in an extent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtentChunk {
    /// UUID of the extent containing this data.
    pub id: String,
    /// Byte offset within the extent.
    pub offset: u64,
    /// Number of bytes.
    pub count: u64,
}

impl ExtentChunk {
    pub fn new(id: String, offset: u64, count: u64) -> Self {
        Self { id, offset, count }
    }
}

/// Blob properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobProperties {
    pub content_length: u64,
    pub content_type: String,
    /// Base64 MD5 digest of the content.
    pub content_md5: String,
    pub etag: String,
    pub created_on: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl BlobProperties {
    /// Creates properties describing `content`.
    pub fn for_content(content: &[u8], content_type: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            content_length: content.len() as u64,
            content_type: content_type.unwrap_or(DEFAULT_CONTENT_TYPE).to_string(),
            content_md5: BASE64.encode(Md5::digest(content)),
            etag: new_etag(),
            created_on: now,
            last_modified: now,
        }
    }

    /// Updates the ETag and last modified time.
    pub fn update_etag(&mut self) {
        self.etag = new_etag();
        self.last_modified = Utc::now();
    }
}

/// Complete blob model stored in the metadata store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobModel {
    /// Container name.
    pub container: String,
    /// Blob name (full path).
    pub name: String,
    /// Blob properties.
    pub properties: BlobProperties,
    /// User-defined metadata.
    pub metadata: Metadata,
    /// Reference to the content.
    pub extent: ExtentChunk,
}

/// Result of downloading a blob.
#[derive(Debug, Clone)]
pub struct BlobDownload {
    pub content: Bytes,
    pub metadata: Metadata,
    pub etag: String,
    pub properties: BlobProperties,
}

/// Optional parameters for an upload.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub metadata: Metadata,
    pub content_type: Option<String>,
}

impl PutOptions {
    pub fn with_metadata(metadata: Metadata) -> Self {
        Self {
            metadata,
            content_type: None,
        }
    }
}

/// Validates a blob name: 1-1024 characters, no control characters.
pub fn validate_blob_name(name: &str) -> StorageResult<()> {
    if name.is_empty() || name.chars().count() > MAX_BLOB_NAME_LEN {
        return Err(StorageError::with_message(
            ErrorCode::InvalidResourceName,
            format!(
                "Blob name must be between 1 and {} characters",
                MAX_BLOB_NAME_LEN
            ),
        ));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(StorageError::with_message(
            ErrorCode::InvalidResourceName,
            "Blob name cannot contain control characters",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_for_content() {
        let props = BlobProperties::for_content(b"hello world", None);
        assert_eq!(props.content_length, 11);
        assert_eq!(props.content_type, DEFAULT_CONTENT_TYPE);
        assert_eq!(props.content_md5, "XrY7u+Ae7tCTyyK7j1rNww==");
    }

    #[test]
    fn test_update_etag_changes_value() {
        let mut props = BlobProperties::for_content(b"x", Some("text/plain"));
        let before = props.etag.clone();
        props.update_etag();
        assert_ne!(before, props.etag);
    }

    #[test]
    fn test_blob_name_validation() {
        assert!(validate_blob_name("example/fizz.txt").is_ok());
        assert!(validate_blob_name("").is_err());
        assert!(validate_blob_name("bad\nname").is_err());
        assert!(validate_blob_name(&"n".repeat(1025)).is_err());
    }
}
