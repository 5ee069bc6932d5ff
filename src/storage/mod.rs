//! Storage layer for records and content.

mod extent;
mod gc;
mod metadata;
mod persist;

pub use extent::*;
pub use gc::*;
pub use metadata::*;
pub use persist::FsMetadataStore;
