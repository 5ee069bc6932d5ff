//! Request context extraction and handling.

use axum::http::{header::HeaderMap, Method, Uri};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::models::Metadata;
use crate::service::ListOptions;

/// Prefix of headers carrying user-defined metadata.
pub const META_HEADER_PREFIX: &str = "x-meta-";

/// Extracted request context containing all relevant information.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique request ID.
    pub request_id: String,
    /// HTTP method.
    pub method: Method,
    /// Request URI.
    pub uri: Uri,
    /// Container name (if present).
    pub container: Option<String>,
    /// Blob name (if present).
    pub blob: Option<String>,
    /// Query parameters.
    pub query_params: HashMap<String, String>,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request timestamp.
    pub timestamp: DateTime<Utc>,
}

impl RequestContext {
    /// Creates a new request context from request parts.
    pub fn new(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        path_params: HashMap<String, String>,
        query_params: HashMap<String, String>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            method,
            uri,
            container: path_params.get("container").cloned(),
            blob: path_params.get("blob").cloned(),
            query_params,
            headers,
            timestamp: Utc::now(),
        }
    }

    /// Returns the value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(|s| s.as_str())
    }

    /// Returns whether a boolean query flag is set to `true`.
    pub fn query_flag(&self, name: &str) -> bool {
        self.query_param(name)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    /// Returns the value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the Content-Type header value.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Returns the comp query parameter.
    pub fn comp(&self) -> Option<&str> {
        self.query_param("comp")
    }

    /// Returns the shared-access token, if one was supplied.
    pub fn sas_token(&self) -> Option<&str> {
        self.query_param("sas")
    }

    /// Returns the account key presented as `Authorization: Key <key>`.
    pub fn account_key(&self) -> Option<&str> {
        self.header("authorization")
            .and_then(|v| v.strip_prefix("Key "))
            .map(str::trim)
    }

    /// Returns the container path parameter.
    pub fn container(&self) -> StorageResult<&str> {
        self.container
            .as_deref()
            .ok_or_else(|| StorageError::with_message(ErrorCode::InvalidInput, "Missing container"))
    }

    /// Returns the blob path parameter.
    pub fn blob(&self) -> StorageResult<&str> {
        self.blob
            .as_deref()
            .ok_or_else(|| StorageError::with_message(ErrorCode::InvalidInput, "Missing blob name"))
    }

    /// Returns user-defined metadata from x-meta-* headers.
    pub fn metadata(&self) -> StorageResult<Metadata> {
        let mut metadata = Metadata::new();
        for (name, value) in &self.headers {
            let Some(key) = name.as_str().strip_prefix(META_HEADER_PREFIX) else {
                continue;
            };
            let value = value.to_str().map_err(|_| {
                StorageError::with_message(
                    ErrorCode::InvalidMetadata,
                    format!("Metadata value of '{}' is not visible ASCII text", key),
                )
            })?;
            metadata.insert(key, value);
        }
        Ok(metadata)
    }

    /// Returns listing parameters from the query string.
    pub fn list_options(&self) -> StorageResult<ListOptions> {
        let page_size = match self.query_param("maxresults") {
            Some(v) => Some(v.parse().map_err(|_| {
                StorageError::with_message(
                    ErrorCode::InvalidInput,
                    format!("Invalid maxresults '{}'", v),
                )
            })?),
            None => None,
        };

        Ok(ListOptions {
            prefix: self.query_param("prefix").map(String::from),
            delimiter: self.query_param("delimiter").map(String::from),
            page_size,
            continuation: self.query_param("marker").map(String::from),
        })
    }
}

/// Formats a DateTime as RFC 1123 format for HTTP headers.
pub fn format_http_date(dt: &DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn context(uri: &str, headers: HeaderMap) -> RequestContext {
        let uri: Uri = uri.parse().unwrap();
        let query = uri
            .query()
            .unwrap_or("")
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RequestContext::new(Method::GET, uri, headers, HashMap::new(), query)
    }

    #[test]
    fn test_metadata_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-meta-doctype", HeaderValue::from_static("textDocuments"));
        headers.insert("x-other", HeaderValue::from_static("ignored"));
        let ctx = context("/containers/c/blobs/b", headers);

        let metadata = ctx.metadata().unwrap();
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata.get("docType"), Some("textDocuments"));
    }

    #[test]
    fn test_non_text_metadata_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert("x-meta-city", HeaderValue::from_bytes(b"K\xc3\xb8benhavn").unwrap());
        let ctx = context("/containers/c/blobs/b", headers);

        let err = ctx.metadata().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidMetadata);
    }

    #[test]
    fn test_account_key_and_list_options() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Key abc=="));
        let ctx = context("/containers/c/blobs?prefix=foo/&maxresults=2", headers);

        assert_eq!(ctx.account_key(), Some("abc=="));
        let options = ctx.list_options().unwrap();
        assert_eq!(options.prefix.as_deref(), Some("foo/"));
        assert_eq!(options.page_size, Some(2));

        let bad = context("/containers/c/blobs?maxresults=lots", HeaderMap::new());
        assert!(bad.list_options().is_err());
    }
}
