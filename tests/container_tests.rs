//! Container registry tests.

mod common;

use blobstore_rs::models::ContainerState;
use blobstore_rs::{ErrorCode, Metadata};
use common::test_service;

#[tokio::test]
async fn test_create_and_get_container() {
    let service = test_service();

    let created = service.create_container("quickstartblobs").await.unwrap();
    assert_eq!(created.state, ContainerState::Active);

    let fetched = service.get_container("quickstartblobs").await.unwrap();
    assert_eq!(fetched.incarnation, created.incarnation);
    assert_eq!(fetched.properties.etag, created.properties.etag);
}

#[tokio::test]
async fn test_create_duplicate_container() {
    let service = test_service();
    service.create_container("dupcontainer").await.unwrap();

    let err = service.create_container("dupcontainer").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ContainerAlreadyExists);
}

#[tokio::test]
async fn test_create_if_not_exists_returns_existing() {
    let service = test_service();

    let (first, created) = service
        .create_container_if_not_exists("idempotent")
        .await
        .unwrap();
    assert!(created);

    let (second, created) = service
        .create_container_if_not_exists("idempotent")
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(first.incarnation, second.incarnation);
}

#[tokio::test]
async fn test_invalid_container_names() {
    let service = test_service();
    for name in ["ab", "UpperCase", "double--hyphen", "trailing-", "under_score"] {
        let err = service.create_container(name).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidResourceName, "{}", name);
    }
}

#[tokio::test]
async fn test_list_containers_in_creation_order() {
    let service = test_service();
    for name in ["zeta", "alpha", "mid"] {
        service.create_container(name).await.unwrap();
    }
    service.delete_container("alpha").await.unwrap();

    let names: Vec<String> = service
        .list_containers()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["zeta", "mid"]);
}

#[tokio::test]
async fn test_deleted_container_blobs_are_gone() {
    let service = test_service();
    service.create_container("cascade").await.unwrap();
    for i in 0..20 {
        service
            .put_blob("cascade", &format!("dir/{}.txt", i), "content", Metadata::new())
            .await
            .unwrap();
    }

    service.delete_container("cascade").await.unwrap();

    for i in 0..20 {
        let err = service
            .get_blob("cascade", &format!("dir/{}.txt", i))
            .await
            .unwrap_err();
        assert!(matches!(
            err.code,
            ErrorCode::ContainerNotFound | ErrorCode::BlobNotFound
        ));
    }

    // Recreating the name yields an empty container.
    service.create_container("cascade").await.unwrap();
    let err = service.get_blob("cascade", "dir/0.txt").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::BlobNotFound);
}

#[tokio::test]
async fn test_delete_all_then_create() {
    let service = test_service();
    for name in ["one", "two", "three"] {
        service.create_container(name).await.unwrap();
    }

    assert_eq!(service.delete_all_containers().await.unwrap(), 3);
    assert!(service.list_containers().await.unwrap().is_empty());

    service.create_container("one").await.unwrap();
}

#[tokio::test]
async fn test_concurrent_deletes_finish_once() {
    let service = test_service();
    service.create_container("racing").await.unwrap();
    for i in 0..50 {
        service
            .put_blob("racing", &format!("b{}", i), "x", Metadata::new())
            .await
            .unwrap();
    }

    let a = tokio::spawn({
        let service = service.clone();
        async move { service.delete_container_if_exists("racing").await }
    });
    let b = tokio::spawn({
        let service = service.clone();
        async move { service.delete_container_if_exists("racing").await }
    });

    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();
    assert!(a || b);
    assert_eq!(service.stored_bytes().await, 0);
    assert!(service.list_containers().await.unwrap().is_empty());
}
