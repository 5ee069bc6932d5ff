//! Request authentication for the HTTP front.

use axum::http::Method;
use tracing::debug;

use super::sas::account_key_matches;
use crate::context::RequestContext;
use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::models::Permission;
use crate::service::BlobService;

/// How a request was authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// Presented the account key; may do anything.
    Account,
    /// Presented a token bound to a stored access policy.
    Token,
    /// Presented nothing and anonymous access is enabled.
    Anonymous,
}

/// Authenticates a request. `required` is the permission a token must grant
/// for the operation; `None` marks management operations, which only the
/// account key may perform.
pub async fn authenticate(
    ctx: &RequestContext,
    service: &BlobService,
    required: Option<Permission>,
) -> StorageResult<Access> {
    // Check for Authorization header (account key)
    if let Some(key) = ctx.account_key() {
        if !account_key_matches(key, &service.config().account_key)? {
            debug!("Request {} presented a wrong account key", ctx.request_id);
            return Err(StorageError::new(ErrorCode::AuthenticationFailed));
        }
        return Ok(Access::Account);
    }

    // Check for shared-access token
    if let Some(token) = ctx.sas_token() {
        let op = required.ok_or_else(|| {
            StorageError::with_message(
                ErrorCode::PermissionDenied,
                "This operation requires the account key",
            )
        })?;
        service
            .authorize_token(token, ctx.container()?, op, ctx.timestamp)
            .await?;
        return Ok(Access::Token);
    }

    if service.config().require_auth {
        return Err(StorageError::new(ErrorCode::AuthenticationFailed));
    }
    Ok(Access::Anonymous)
}

/// Returns the permission a blob-level request needs.
pub fn blob_required_permission(ctx: &RequestContext) -> Option<Permission> {
    match ctx.method {
        Method::GET | Method::HEAD => Some(Permission::Read),
        Method::PUT => Some(Permission::Write),
        Method::DELETE => Some(Permission::Delete),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccessPolicy, Permissions};
    use axum::http::{HeaderMap, HeaderValue, Uri};
    use chrono::{Duration, Utc};
    use std::collections::HashMap;

    fn blob_request(method: Method, headers: HeaderMap, sas: Option<&str>) -> RequestContext {
        let mut path = HashMap::new();
        path.insert("container".to_string(), "secure".to_string());
        path.insert("blob".to_string(), "file.txt".to_string());
        let mut query = HashMap::new();
        if let Some(sas) = sas {
            query.insert("sas".to_string(), sas.to_string());
        }
        RequestContext::new(method, Uri::from_static("/"), headers, path, query)
    }

    #[tokio::test]
    async fn test_account_key_grants_access() {
        let service = BlobService::in_memory();
        let mut headers = HeaderMap::new();
        let value = format!("Key {}", service.config().account_key);
        headers.insert("authorization", HeaderValue::from_str(&value).unwrap());

        let ctx = blob_request(Method::DELETE, headers, None);
        assert_eq!(authenticate(&ctx, &service, None).await.unwrap(), Access::Account);

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Key wrong"));
        let ctx = blob_request(Method::GET, headers, None);
        let err = authenticate(&ctx, &service, None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthenticationFailed);
    }

    #[tokio::test]
    async fn test_token_checked_against_policy() {
        let service = BlobService::in_memory();
        service.create_container("secure").await.unwrap();
        let now = Utc::now();
        service
            .set_policies(
                "secure",
                vec![AccessPolicy::new(
                    "reader",
                    now - Duration::hours(1),
                    now + Duration::hours(1),
                    Permissions::parse("r").unwrap(),
                )],
            )
            .await
            .unwrap();
        let token = service.issue_token("secure", "reader").await.unwrap();

        let ctx = blob_request(Method::GET, HeaderMap::new(), Some(&token));
        let required = blob_required_permission(&ctx);
        assert_eq!(authenticate(&ctx, &service, required).await.unwrap(), Access::Token);

        let ctx = blob_request(Method::PUT, HeaderMap::new(), Some(&token));
        let required = blob_required_permission(&ctx);
        let err = authenticate(&ctx, &service, required).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::PermissionDenied);

        let err = authenticate(&ctx, &service, None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::PermissionDenied);
    }

    #[tokio::test]
    async fn test_wrong_account_key_rejected() {
        let service = BlobService::in_memory();
        for presented in ["abc", &service.config().account_key[1..]] {
            let mut headers = HeaderMap::new();
            let value = format!("Key {}", presented);
            headers.insert("authorization", HeaderValue::from_str(&value).unwrap());
            let ctx = blob_request(Method::GET, headers, None);
            let err = authenticate(&ctx, &service, None).await.unwrap_err();
            assert_eq!(err.code, ErrorCode::AuthenticationFailed);
        }
    }
}
