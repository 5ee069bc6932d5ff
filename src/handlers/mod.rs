//! Request handlers for the HTTP front.

mod blob;
mod container;
mod policy;

pub use blob::*;
pub use container::*;
pub use policy::*;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::context::{format_http_date, RequestContext};
use crate::error::{ErrorCode, StorageError, StorageResult};

/// Creates common response headers.
pub fn common_headers(ctx: &RequestContext) -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert_header(&mut headers, "x-request-id", &ctx.request_id);
    insert_header(&mut headers, "date", &format_http_date(&Utc::now()));
    headers.insert(
        header::SERVER,
        HeaderValue::from_static(concat!("blobstore-rs/", env!("CARGO_PKG_VERSION"))),
    );
    headers
}

/// Inserts a header, skipping values that are not valid header text.
pub fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) {
    if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::from_str(value)) {
        headers.insert(name, value);
    }
}

/// Adds ETag and Last-Modified headers.
pub fn add_etag_headers(headers: &mut HeaderMap, etag: &str, last_modified: &DateTime<Utc>) {
    insert_header(headers, "etag", etag);
    insert_header(headers, "last-modified", &format_http_date(last_modified));
}

/// Builds a response with the given status, headers, and body.
pub fn build_response(status: StatusCode, headers: HeaderMap, body: Body) -> Response<Body> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Builds a JSON response.
pub fn json_response<T: Serialize>(
    status: StatusCode,
    mut headers: HeaderMap,
    value: &T,
) -> StorageResult<Response<Body>> {
    let body = serde_json::to_vec(value).map_err(|e| {
        StorageError::with_message(
            ErrorCode::InternalError,
            format!("Failed to encode response: {}", e),
        )
    })?;
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Ok(build_response(status, headers, Body::from(body)))
}

/// Parses a JSON request body.
pub fn parse_json<T: serde::de::DeserializeOwned>(body: &[u8]) -> StorageResult<T> {
    serde_json::from_slice(body).map_err(|e| {
        StorageError::with_message(ErrorCode::InvalidInput, format!("Invalid request body: {}", e))
    })
}
