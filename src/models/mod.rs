//! Data models for the blob store.

mod blob;
mod container;
mod metadata;
mod policy;

pub use blob::*;
pub use container::*;
pub use metadata::*;
pub use policy::*;

/// Generates a fresh, previously unseen ETag.
pub(crate) fn new_etag() -> String {
    format!("\"0x{}\"", uuid::Uuid::new_v4().simple())
}
