//! Blob-level handlers.

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode},
};
use bytes::Bytes;
use serde::Serialize;

use crate::context::{RequestContext, META_HEADER_PREFIX};
use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::models::{BlobProperties, Metadata, PutOptions};
use crate::service::BlobService;

use super::{add_etag_headers, build_response, common_headers, insert_header, json_response};

#[derive(Serialize)]
struct Written {
    etag: String,
}

/// PUT /containers/{container}/blobs/{blob} - Upload blob, or replace its
/// metadata with `?comp=metadata`.
pub async fn put_blob(
    ctx: &RequestContext,
    service: &BlobService,
    body: Bytes,
) -> StorageResult<Response<Body>> {
    let container = ctx.container()?;
    let name = ctx.blob()?;

    let (status, etag) = match ctx.comp() {
        Some("metadata") => {
            let etag = service
                .set_blob_metadata(container, name, ctx.metadata()?)
                .await?;
            (StatusCode::OK, etag)
        }
        None => {
            let options = PutOptions {
                metadata: ctx.metadata()?,
                content_type: ctx.content_type().map(String::from),
            };
            let etag = service
                .put_blob_with_options(container, name, body, options)
                .await?;
            (StatusCode::CREATED, etag)
        }
        Some(other) => {
            return Err(StorageError::with_message(
                ErrorCode::InvalidInput,
                format!("Unsupported comp '{}'", other),
            ))
        }
    };

    let mut headers = common_headers(ctx);
    insert_header(&mut headers, "etag", &etag);
    json_response(status, headers, &Written { etag })
}

/// GET /containers/{container}/blobs/{blob} - Download blob.
pub async fn get_blob(
    ctx: &RequestContext,
    service: &BlobService,
) -> StorageResult<Response<Body>> {
    let download = service.get_blob(ctx.container()?, ctx.blob()?).await?;

    let mut headers = common_headers(ctx);
    add_property_headers(&mut headers, &download.properties, &download.metadata)?;
    Ok(build_response(
        StatusCode::OK,
        headers,
        Body::from(download.content),
    ))
}

/// HEAD /containers/{container}/blobs/{blob} - Get blob properties.
pub async fn get_blob_properties(
    ctx: &RequestContext,
    service: &BlobService,
) -> StorageResult<Response<Body>> {
    let blob = service
        .get_blob_properties(ctx.container()?, ctx.blob()?)
        .await?;

    let mut headers = common_headers(ctx);
    add_property_headers(&mut headers, &blob.properties, &blob.metadata)?;
    Ok(build_response(StatusCode::OK, headers, Body::empty()))
}

/// DELETE /containers/{container}/blobs/{blob} - Delete blob.
pub async fn delete_blob(
    ctx: &RequestContext,
    service: &BlobService,
) -> StorageResult<Response<Body>> {
    if !service.delete_blob(ctx.container()?, ctx.blob()?).await? {
        return Err(StorageError::new(ErrorCode::BlobNotFound));
    }
    Ok(build_response(
        StatusCode::ACCEPTED,
        common_headers(ctx),
        Body::empty(),
    ))
}

fn add_property_headers(
    headers: &mut HeaderMap,
    properties: &BlobProperties,
    metadata: &Metadata,
) -> StorageResult<()> {
    add_etag_headers(headers, &properties.etag, &properties.last_modified);
    insert_header(headers, "content-type", &properties.content_type);
    insert_header(headers, "content-length", &properties.content_length.to_string());
    insert_header(headers, "content-md5", &properties.content_md5);

    for (key, value) in metadata.iter() {
        let name = HeaderName::try_from(format!("{}{}", META_HEADER_PREFIX, key));
        let value = HeaderValue::from_str(value);
        match (name, value) {
            (Ok(name), Ok(value)) if value.to_str().is_ok() => {
                headers.insert(name, value);
            }
            _ => {
                return Err(StorageError::with_message(
                    ErrorCode::InvalidMetadata,
                    format!("Metadata '{}' cannot be returned as a header", key),
                ))
            }
        }
    }
    Ok(())
}
