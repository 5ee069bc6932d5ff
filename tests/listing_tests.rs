//! Listing engine tests.

mod common;

use futures_util::StreamExt;

use blobstore_rs::{BlobService, ErrorCode, ListEntry, ListOptions, Metadata};
use common::test_service;

async fn populate(service: &BlobService, container: &str, names: &[&str]) {
    service.create_container(container).await.unwrap();
    for name in names {
        service
            .put_blob(container, name, name.as_bytes().to_vec(), Metadata::new())
            .await
            .unwrap();
    }
}

fn keys(entries: &[ListEntry]) -> Vec<String> {
    entries.iter().map(|e| e.key().to_string()).collect()
}

#[tokio::test]
async fn test_single_prefix_entry_per_directory() {
    let service = test_service();
    populate(
        &service,
        "flat",
        &["foo.txt", "bar.txt", "example/fizz.txt", "example/buzz.txt"],
    )
    .await;

    // Listed from the root with no prefix, so the top-level blobs appear
    // next to a single grouped entry for both names under example/.
    let entries = service
        .list_blobs("flat", ListOptions::default().delimiter("/"))
        .await
        .unwrap()
        .collect_all()
        .await
        .unwrap();

    assert_eq!(keys(&entries), vec!["bar.txt", "example/", "foo.txt"]);
    let prefixes = entries
        .iter()
        .filter(|e| matches!(e, ListEntry::Prefix { .. }))
        .count();
    assert_eq!(prefixes, 1);
}

#[tokio::test]
async fn test_prefix_filters_names() {
    let service = test_service();
    populate(
        &service,
        "nested",
        &["foo.txt", "bar.txt", "example/fizz.txt", "example/buzz.txt", "example/sub/deep.txt"],
    )
    .await;

    let entries = service
        .list_blobs("nested", ListOptions::with_prefix("example/").delimiter("/"))
        .await
        .unwrap()
        .collect_all()
        .await
        .unwrap();
    assert_eq!(
        keys(&entries),
        vec!["example/buzz.txt", "example/fizz.txt", "example/sub/"]
    );

    let flat = service
        .list_blobs("nested", ListOptions::with_prefix("example/"))
        .await
        .unwrap()
        .collect_all()
        .await
        .unwrap();
    assert_eq!(flat.len(), 3);
    assert!(flat.iter().all(|e| matches!(e, ListEntry::Blob { .. })));
}

#[tokio::test]
async fn test_pages_resume_from_token() {
    let service = test_service();
    let names: Vec<String> = (0..25).map(|i| format!("item-{:03}", i)).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    populate(&service, "paged", &refs).await;

    let mut seen = Vec::new();
    let mut token: Option<String> = None;
    let mut pages = 0;
    loop {
        let mut options = ListOptions::default().page_size(10);
        options.continuation = token.clone();
        let mut listing = service.list_blobs("paged", options).await.unwrap();
        let page = listing.next_page().await.unwrap().unwrap();
        pages += 1;
        seen.extend(keys(&page.entries));
        match page.continuation {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    assert_eq!(pages, 3);
    assert_eq!(seen, names);
}

#[tokio::test]
async fn test_stream_yields_every_entry() {
    let service = test_service();
    let names: Vec<String> = (0..12).map(|i| format!("s/{:02}", i)).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    populate(&service, "streamed", &refs).await;

    let listing = service
        .list_blobs("streamed", ListOptions::with_prefix("s/").page_size(5))
        .await
        .unwrap();
    let entries: Vec<ListEntry> = listing
        .into_stream()
        .map(|entry| entry.unwrap())
        .collect()
        .await;
    assert_eq!(keys(&entries), names);
}

#[tokio::test]
async fn test_empty_container_lists_nothing() {
    let service = test_service();
    service.create_container("empty").await.unwrap();

    let mut listing = service
        .list_blobs("empty", ListOptions::default())
        .await
        .unwrap();
    let page = listing.next_page().await.unwrap().unwrap();
    assert!(page.entries.is_empty());
    assert!(page.continuation.is_none());
    assert!(listing.next_page().await.unwrap().is_none());
}

#[tokio::test]
async fn test_token_from_recreated_container_rejected() {
    let service = test_service();
    populate(&service, "reborn", &["a", "b", "c"]).await;

    let mut listing = service
        .list_blobs("reborn", ListOptions::default().page_size(1))
        .await
        .unwrap();
    let token = listing
        .next_page()
        .await
        .unwrap()
        .unwrap()
        .continuation
        .unwrap();

    service.delete_container("reborn").await.unwrap();
    populate(&service, "reborn", &["a", "b", "c"]).await;

    let err = service
        .list_blobs("reborn", ListOptions::default().continuation(token))
        .await
        .err()
        .unwrap();
    assert_eq!(err.code, ErrorCode::InvalidContinuationToken);

    let err = listing.next_page().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidContinuationToken);
}

#[tokio::test]
async fn test_listing_missing_container() {
    let service = test_service();
    let err = service
        .list_blobs("absent", ListOptions::default())
        .await
        .err()
        .unwrap();
    assert_eq!(err.code, ErrorCode::ContainerNotFound);
}
