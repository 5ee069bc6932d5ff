//! blobstore-rs: a self-contained blob storage service.
//!
//! Named containers hold named, immutable-per-version blobs with
//! user-defined metadata. Containers carry stored access policies that
//! authorize time-bounded operations, blobs are enumerated through paged,
//! prefix-filtered listings, and deleting a container is a resumable
//! two-phase teardown. The core is [`BlobService`]; [`BlobServer`] exposes it
//! over HTTP.
//!
//! # Example
//!
//! ```no_run
//! use blobstore_rs::{BlobServerBuilder, Config};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = BlobServerBuilder::new()
//!         .config(Config::default())
//!         .build()
//!         .await
//!         .unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod server;
pub mod service;
pub mod storage;
pub mod trigger;

// Re-exports for convenience
pub use config::{Args, Config, DEFAULT_ACCOUNT_KEY, DEFAULT_PORT};
pub use error::{ErrorCode, StorageError, StorageResult};
pub use models::{AccessPolicy, Metadata, Permission, Permissions};
pub use server::{BlobServer, BlobServerBuilder};
pub use service::{BlobListing, BlobService, ListEntry, ListOptions, ListPage};
pub use storage::{ExtentStore, MemoryExtentStore, MemoryMetadataStore, MetadataStore};
pub use trigger::{BlobEvent, BlobTriggerHandler, LoggingTrigger, TriggerDispatcher};
