//! Request routing for the HTTP front.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, Method, Response, StatusCode, Uri},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use std::collections::HashMap;

use crate::auth::{authenticate, blob_required_permission};
use crate::context::RequestContext;
use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::handlers;
use crate::models::Permission;
use crate::service::BlobService;

/// Application state shared between handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: BlobService,
}

/// Creates the main router for the blob service.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/containers", get(containers_handler))
        .route(
            "/containers/:container",
            get(container_handler)
                .put(container_handler)
                .delete(container_handler),
        )
        .route(
            "/containers/:container/policies",
            get(policies_handler).put(policies_handler),
        )
        .route(
            "/containers/:container/tokens/:policy",
            post(token_handler),
        )
        .route("/containers/:container/blobs", get(list_handler))
        .route(
            "/containers/:container/blobs/*blob",
            get(blob_handler)
                .head(blob_handler)
                .put(blob_handler)
                .delete(blob_handler),
        )
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Handler for the container collection.
async fn containers_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response<Body> {
    let ctx = RequestContext::new(method, uri, headers, HashMap::new(), query);
    respond(&ctx, async {
        authenticate(&ctx, &state.service, None).await?;
        handlers::list_containers(&ctx, &state.service).await
    })
    .await
}

/// Handler for container-level operations.
async fn container_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path(params): Path<HashMap<String, String>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response<Body> {
    let ctx = RequestContext::new(method, uri, headers, params, query);
    respond(&ctx, async {
        authenticate(&ctx, &state.service, None).await?;
        match ctx.method {
            Method::GET => handlers::get_container(&ctx, &state.service).await,
            Method::PUT => handlers::create_container(&ctx, &state.service).await,
            Method::DELETE => handlers::delete_container(&ctx, &state.service).await,
            _ => Err(unsupported(&ctx)),
        }
    })
    .await
}

/// Handler for stored access policies.
async fn policies_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path(params): Path<HashMap<String, String>>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response<Body> {
    let ctx = RequestContext::new(method, uri, headers, params, query);
    respond(&ctx, async {
        authenticate(&ctx, &state.service, None).await?;
        match ctx.method {
            Method::GET => handlers::get_policies(&ctx, &state.service).await,
            Method::PUT => handlers::set_policies(&ctx, &state.service, body).await,
            _ => Err(unsupported(&ctx)),
        }
    })
    .await
}

/// Handler for token issuance.
async fn token_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path(params): Path<HashMap<String, String>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response<Body> {
    let policy = params.get("policy").cloned().unwrap_or_default();
    let ctx = RequestContext::new(method, uri, headers, params, query);
    respond(&ctx, async {
        authenticate(&ctx, &state.service, None).await?;
        handlers::issue_token(&ctx, &state.service, &policy).await
    })
    .await
}

/// Handler for blob listing.
async fn list_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path(params): Path<HashMap<String, String>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response<Body> {
    let ctx = RequestContext::new(method, uri, headers, params, query);
    respond(&ctx, async {
        authenticate(&ctx, &state.service, Some(Permission::List)).await?;
        handlers::list_blobs(&ctx, &state.service).await
    })
    .await
}

/// Handler for blob-level operations.
async fn blob_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Path(params): Path<HashMap<String, String>>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response<Body> {
    let ctx = RequestContext::new(method, uri, headers, params, query);
    respond(&ctx, async {
        authenticate(&ctx, &state.service, blob_required_permission(&ctx)).await?;
        match ctx.method {
            Method::GET => handlers::get_blob(&ctx, &state.service).await,
            Method::HEAD => handlers::get_blob_properties(&ctx, &state.service).await,
            Method::PUT => handlers::put_blob(&ctx, &state.service, body).await,
            Method::DELETE => handlers::delete_blob(&ctx, &state.service).await,
            _ => Err(unsupported(&ctx)),
        }
    })
    .await
}

/// Renders the outcome of a request, tagging errors with its request ID.
async fn respond(
    ctx: &RequestContext,
    fut: impl std::future::Future<Output = StorageResult<Response<Body>>>,
) -> Response<Body> {
    match fut.await {
        Ok(response) => response,
        Err(e) => {
            if e.code.status_code() == StatusCode::INTERNAL_SERVER_ERROR {
                tracing::error!("Request {} {} failed: {}", ctx.method, ctx.uri, e);
            }
            e.with_request_id(&ctx.request_id).into_response()
        }
    }
}

fn unsupported(ctx: &RequestContext) -> StorageError {
    StorageError::with_message(
        ErrorCode::InvalidInput,
        format!("Unsupported method {} for {}", ctx.method, ctx.uri.path()),
    )
}
