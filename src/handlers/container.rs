//! Container-level handlers.

use axum::{
    body::Body,
    http::{Response, StatusCode},
};
use serde::Serialize;

use crate::context::RequestContext;
use crate::error::StorageResult;
use crate::service::{BlobService, ListPage};

use super::{add_etag_headers, common_headers, json_response};

/// Result of a conditional container operation.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConditionalResult<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    container: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deleted: Option<bool>,
}

/// GET /containers - List containers.
pub async fn list_containers(
    ctx: &RequestContext,
    service: &BlobService,
) -> StorageResult<Response<Body>> {
    let containers = service.list_containers().await?;
    json_response(StatusCode::OK, common_headers(ctx), &containers)
}

/// PUT /containers/{container} - Create container.
pub async fn create_container(
    ctx: &RequestContext,
    service: &BlobService,
) -> StorageResult<Response<Body>> {
    let name = ctx.container()?;

    if ctx.query_flag("if_not_exists") {
        let (container, created) = service.create_container_if_not_exists(name).await?;
        let mut headers = common_headers(ctx);
        add_etag_headers(
            &mut headers,
            &container.properties.etag,
            &container.properties.last_modified,
        );
        let status = if created {
            StatusCode::CREATED
        } else {
            StatusCode::OK
        };
        let result = ConditionalResult {
            container: Some(container),
            created: Some(created),
            deleted: None,
        };
        return json_response(status, headers, &result);
    }

    let container = service.create_container(name).await?;
    let mut headers = common_headers(ctx);
    add_etag_headers(
        &mut headers,
        &container.properties.etag,
        &container.properties.last_modified,
    );
    json_response(StatusCode::CREATED, headers, &container)
}

/// GET /containers/{container} - Get container.
pub async fn get_container(
    ctx: &RequestContext,
    service: &BlobService,
) -> StorageResult<Response<Body>> {
    let container = service.get_container(ctx.container()?).await?;
    let mut headers = common_headers(ctx);
    add_etag_headers(
        &mut headers,
        &container.properties.etag,
        &container.properties.last_modified,
    );
    json_response(StatusCode::OK, headers, &container)
}

/// DELETE /containers/{container} - Delete container.
pub async fn delete_container(
    ctx: &RequestContext,
    service: &BlobService,
) -> StorageResult<Response<Body>> {
    let name = ctx.container()?;

    if ctx.query_flag("if_exists") {
        let deleted = service.delete_container_if_exists(name).await?;
        let result = ConditionalResult::<()> {
            container: None,
            created: None,
            deleted: Some(deleted),
        };
        return json_response(StatusCode::ACCEPTED, common_headers(ctx), &result);
    }

    let container = service.delete_container(name).await?;
    json_response(StatusCode::ACCEPTED, common_headers(ctx), &container)
}

/// GET /containers/{container}/blobs - List one page of blobs.
pub async fn list_blobs(
    ctx: &RequestContext,
    service: &BlobService,
) -> StorageResult<Response<Body>> {
    let mut listing = service
        .list_blobs(ctx.container()?, ctx.list_options()?)
        .await?;
    let page = listing.next_page().await?.unwrap_or(ListPage {
        entries: Vec::new(),
        continuation: None,
    });
    json_response(StatusCode::OK, common_headers(ctx), &page)
}
