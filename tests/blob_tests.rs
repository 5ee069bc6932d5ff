//! Blob store tests.

mod common;

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use blobstore_rs::models::ExtentChunk;
use blobstore_rs::{
    BlobService, Config, ErrorCode, ExtentStore, MemoryExtentStore, MemoryMetadataStore, Metadata,
    StorageResult,
};
use common::{metadata, test_service};
use rand::Rng;

#[tokio::test]
async fn test_put_then_get_roundtrip() {
    let service = test_service();
    service.create_container("roundtrip").await.unwrap();

    let mut etags = HashSet::new();
    let mut rng = rand::thread_rng();
    for i in 0..20 {
        let len = rng.gen_range(0..4096);
        let content: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        let name = format!("blob-{}", i);

        let etag = service
            .put_blob("roundtrip", &name, content.clone(), Metadata::new())
            .await
            .unwrap();
        assert!(etags.insert(etag.clone()), "etag reused");

        let download = service.get_blob("roundtrip", &name).await.unwrap();
        assert_eq!(download.content.as_ref(), content.as_slice());
        assert_eq!(download.etag, etag);
        assert_eq!(download.properties.content_length, len as u64);
    }
}

#[tokio::test]
async fn test_overwrite_gets_fresh_etag() {
    let service = test_service();
    service.create_container("overwrite").await.unwrap();

    let first = service
        .put_blob("overwrite", "file.txt", "v1", Metadata::new())
        .await
        .unwrap();
    let created_on = service
        .get_blob_properties("overwrite", "file.txt")
        .await
        .unwrap()
        .properties
        .created_on;

    let second = service
        .put_blob("overwrite", "file.txt", "v2", Metadata::new())
        .await
        .unwrap();
    assert_ne!(first, second);

    let download = service.get_blob("overwrite", "file.txt").await.unwrap();
    assert_eq!(download.content.as_ref(), b"v2");
    assert_eq!(download.properties.created_on, created_on);
    assert_eq!(service.stored_bytes().await, 2);
}

#[tokio::test]
async fn test_metadata_is_case_insensitive() {
    let service = test_service();
    service.create_container("meta").await.unwrap();

    let meta = metadata(&[("docType", "textDocuments"), ("category", "guidance"), ("DOCTYPE", "final")]);
    assert_eq!(meta.len(), 2);

    service
        .put_blob("meta", "doc.txt", "hello", meta.clone())
        .await
        .unwrap();
    let download = service.get_blob("meta", "doc.txt").await.unwrap();

    assert_eq!(download.metadata, meta);
    assert_eq!(download.metadata.get("doctype"), Some("final"));
    assert_eq!(download.metadata.get("Category"), Some("guidance"));

    let reordered = metadata(&[("CATEGORY", "guidance"), ("doctype", "final")]);
    assert_eq!(download.metadata, reordered);
}

#[tokio::test]
async fn test_invalid_metadata_rejected() {
    let service = test_service();
    service.create_container("badmeta").await.unwrap();

    let err = service
        .put_blob("badmeta", "x", "x", metadata(&[("has-dash", "v")]))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidMetadata);
    assert!(!service.blob_exists("badmeta", "x").await.unwrap());
}

#[tokio::test]
async fn test_set_metadata_keeps_content() {
    let service = test_service();
    service.create_container("setmeta").await.unwrap();
    let etag = service
        .put_blob("setmeta", "a.txt", "payload", metadata(&[("old", "1")]))
        .await
        .unwrap();

    let new_etag = service
        .set_blob_metadata("setmeta", "a.txt", metadata(&[("new", "2")]))
        .await
        .unwrap();
    assert_ne!(etag, new_etag);

    let download = service.get_blob("setmeta", "a.txt").await.unwrap();
    assert_eq!(download.content.as_ref(), b"payload");
    assert_eq!(download.metadata.get("old"), None);
    assert_eq!(download.metadata.get("new"), Some("2"));

    let err = service
        .set_blob_metadata("setmeta", "missing", Metadata::new())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::BlobNotFound);
}

#[tokio::test]
async fn test_missing_container_and_blob() {
    let service = test_service();

    let err = service
        .put_blob("nowhere", "x", "x", Metadata::new())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ContainerNotFound);

    service.create_container("somewhere").await.unwrap();
    let err = service.get_blob("somewhere", "x").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::BlobNotFound);
    assert!(!service.delete_blob("somewhere", "x").await.unwrap());
}

#[tokio::test]
async fn test_delete_blob_releases_content() {
    let service = test_service();
    service.create_container("release").await.unwrap();
    service
        .put_blob("release", "big", vec![7u8; 10_000], Metadata::new())
        .await
        .unwrap();
    assert_eq!(service.stored_bytes().await, 10_000);

    assert!(service.delete_blob("release", "big").await.unwrap());
    assert_eq!(service.stored_bytes().await, 0);
    assert!(!service.blob_exists("release", "big").await.unwrap());
}

#[tokio::test]
async fn test_concurrent_puts_never_mix() {
    let service = test_service();
    service.create_container("contended").await.unwrap();

    let old = vec![b'a'; 64 * 1024];
    let new = vec![b'b'; 64 * 1024];
    service
        .put_blob("contended", "x", old.clone(), Metadata::new())
        .await
        .unwrap();

    let writers: Vec<_> = (0..2)
        .map(|i| {
            let service = service.clone();
            let content = if i == 0 { old.clone() } else { new.clone() };
            tokio::spawn(async move {
                for _ in 0..25 {
                    service
                        .put_blob("contended", "x", content.clone(), Metadata::new())
                        .await
                        .unwrap();
                }
            })
        })
        .collect();

    let reader = {
        let service = service.clone();
        tokio::spawn(async move {
            for _ in 0..100 {
                let content = service.get_blob("contended", "x").await.unwrap().content;
                let first = content[0];
                assert!(first == b'a' || first == b'b');
                assert!(content.iter().all(|&b| b == first), "observed a mixed value");
                tokio::task::yield_now().await;
            }
        })
    };

    for writer in writers {
        writer.await.unwrap();
    }
    reader.await.unwrap();

    let last = service.get_blob("contended", "x").await.unwrap().content;
    assert!(last.as_ref() == old.as_slice() || last.as_ref() == new.as_slice());
    assert_eq!(service.stored_bytes().await, 64 * 1024);
}

/// Extent store whose writes stall after storing the data.
struct StallingExtents {
    inner: MemoryExtentStore,
    stall: AtomicBool,
}

#[async_trait]
impl ExtentStore for StallingExtents {
    async fn write(&self, data: Bytes) -> StorageResult<ExtentChunk> {
        let chunk = self.inner.write(data).await?;
        if self.stall.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
        Ok(chunk)
    }

    async fn read(&self, chunk: &ExtentChunk) -> StorageResult<Bytes> {
        self.inner.read(chunk).await
    }

    async fn delete(&self, extent_id: &str) -> StorageResult<()> {
        self.inner.delete(extent_id).await
    }

    async fn list_ids(&self) -> Vec<String> {
        self.inner.list_ids().await
    }

    async fn total_size(&self) -> u64 {
        self.inner.total_size().await
    }
}

#[tokio::test]
async fn test_timed_out_put_keeps_previous_value() {
    let extents = Arc::new(StallingExtents {
        inner: MemoryExtentStore::new(),
        stall: AtomicBool::new(false),
    });
    let service = BlobService::with_storage(
        Config {
            operation_timeout: Duration::from_millis(200),
            ..Config::in_memory()
        },
        Arc::new(MemoryMetadataStore::new()),
        extents.clone(),
    );
    service.create_container("stalled").await.unwrap();
    let etag = service
        .put_blob("stalled", "x", "original", Metadata::new())
        .await
        .unwrap();

    extents.stall.store(true, Ordering::SeqCst);
    let err = service
        .put_blob("stalled", "x", "replacement", Metadata::new())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::OperationTimedOut);
    extents.stall.store(false, Ordering::SeqCst);

    let download = service.get_blob("stalled", "x").await.unwrap();
    assert_eq!(download.content.as_ref(), b"original");
    assert_eq!(download.etag, etag);

    // The abandoned extent is reclaimed on the second sweep that finds it.
    let gc = service.garbage_collector();
    assert_eq!(gc.collect().await.unwrap(), 0);
    assert_eq!(gc.collect().await.unwrap(), 1);
    assert_eq!(service.stored_bytes().await, "original".len() as u64);
}

#[tokio::test]
async fn test_abandoned_writes_match_persisted_state() {
    let dir = tempfile::tempdir().unwrap();
    let service = BlobService::open(Config::persistent(dir.path())).await.unwrap();
    service.create_container("cancel").await.unwrap();
    service
        .put_blob("cancel", "x", "old", Metadata::new())
        .await
        .unwrap();

    for attempt in 0..40u64 {
        let put = service.put_blob("cancel", "x", format!("new-{}", attempt), Metadata::new());
        let _ = tokio::time::timeout(Duration::from_micros(50 + attempt * 10), put).await;

        // Reading takes the key lock, so any swap already under way is done.
        let live = service.get_blob("cancel", "x").await.unwrap();
        let reopened = BlobService::open(Config::persistent(dir.path())).await.unwrap();
        let persisted = reopened.get_blob("cancel", "x").await.unwrap();
        assert_eq!(live.etag, persisted.etag, "attempt {}", attempt);
        assert_eq!(live.content, persisted.content, "attempt {}", attempt);
    }

    for attempt in 0..10u64 {
        service
            .put_blob("cancel", "y", "doomed", Metadata::new())
            .await
            .unwrap();
        let delete = service.delete_blob("cancel", "y");
        let _ = tokio::time::timeout(Duration::from_micros(20 + attempt * 10), delete).await;

        let live = service.blob_exists("cancel", "y").await.unwrap();
        let reopened = BlobService::open(Config::persistent(dir.path())).await.unwrap();
        assert_eq!(live, reopened.blob_exists("cancel", "y").await.unwrap(), "attempt {}", attempt);
    }
}
