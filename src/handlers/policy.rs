//! Access policy handlers.

use axum::{
    body::Body,
    http::{Response, StatusCode},
};
use bytes::Bytes;
use serde::Serialize;

use crate::context::RequestContext;
use crate::error::StorageResult;
use crate::models::AccessPolicy;
use crate::service::BlobService;

use super::{common_headers, json_response, parse_json};

#[derive(Serialize)]
struct IssuedToken {
    container: String,
    policy: String,
    token: String,
}

/// GET /containers/{container}/policies - Get stored access policies.
pub async fn get_policies(
    ctx: &RequestContext,
    service: &BlobService,
) -> StorageResult<Response<Body>> {
    let policies = service.get_policies(ctx.container()?).await?;
    json_response(StatusCode::OK, common_headers(ctx), &policies)
}

/// PUT /containers/{container}/policies - Replace stored access policies.
pub async fn set_policies(
    ctx: &RequestContext,
    service: &BlobService,
    body: Bytes,
) -> StorageResult<Response<Body>> {
    let policies: Vec<AccessPolicy> = parse_json(&body)?;
    let container = ctx.container()?;
    service.set_policies(container, policies).await?;

    let policies = service.get_policies(container).await?;
    json_response(StatusCode::OK, common_headers(ctx), &policies)
}

/// POST /containers/{container}/tokens/{policy} - Issue a token.
pub async fn issue_token(
    ctx: &RequestContext,
    service: &BlobService,
    policy_id: &str,
) -> StorageResult<Response<Body>> {
    let container = ctx.container()?;
    let token = service.issue_token(container, policy_id).await?;
    let issued = IssuedToken {
        container: container.to_string(),
        policy: policy_id.to_string(),
        token,
    };
    json_response(StatusCode::CREATED, common_headers(ctx), &issued)
}
