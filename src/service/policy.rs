//! Access policy engine.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, info};

use super::{commit, BlobService};
use crate::auth::SasToken;
use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::models::{AccessPolicy, Permission};

impl BlobService {
    /// Replaces the whole policy set of a container. On failure the previous
    /// set is left untouched.
    pub async fn set_policies(
        &self,
        container: &str,
        policies: Vec<AccessPolicy>,
    ) -> StorageResult<()> {
        let max = self.config().max_policies_per_container;
        if policies.len() > max {
            return Err(StorageError::with_message(
                ErrorCode::TooManyPolicies,
                format!("At most {} access policies are allowed, got {}", max, policies.len()),
            ));
        }

        let mut seen = HashSet::new();
        for policy in &policies {
            policy.validate()?;
            if !seen.insert(policy.id.as_str()) {
                return Err(StorageError::with_message(
                    ErrorCode::InvalidInput,
                    format!("Duplicate policy id '{}'", policy.id),
                ));
            }
        }

        let (gate, model) = self
            .timed("set_policies", async {
                let gate = self.locks().exclusive(container).await;
                let mut model = self.existing_container(container).await?;
                model.ensure_writable()?;
                model.policies = policies;
                model.properties.update_etag();
                Ok((gate, model))
            })
            .await?;

        let service = self.clone();
        commit(async move {
            let _gate = gate;
            let count = model.policies.len();
            let name = model.name.clone();
            service.metadata().update_container(model).await?;
            info!("Set {} access policies on container {}", count, name);
            Ok(())
        })
        .await
    }

    /// Returns the current policy set of a container.
    pub async fn get_policies(&self, container: &str) -> StorageResult<Vec<AccessPolicy>> {
        self.timed("get_policies", async {
            Ok(self.existing_container(container).await?.policies)
        })
        .await
    }

    /// Checks whether `policy_id` grants `op` on `container` at `now`.
    pub async fn authorize(
        &self,
        container: &str,
        policy_id: &str,
        op: Permission,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let policies = self.get_policies(container).await?;
        let policy = policies
            .iter()
            .find(|p| p.id == policy_id)
            .ok_or_else(|| {
                StorageError::with_message(
                    ErrorCode::PolicyNotFound,
                    format!("No access policy '{}' on container {}", policy_id, container),
                )
            })?;

        if !policy.is_active_at(now) {
            return Err(StorageError::with_message(
                ErrorCode::PolicyExpired,
                format!("Access policy '{}' is not valid at {}", policy_id, now.to_rfc3339()),
            ));
        }

        if !policy.permissions.contains(op) {
            return Err(StorageError::with_message(
                ErrorCode::PermissionDenied,
                format!(
                    "Access policy '{}' grants '{}', operation needs '{}'",
                    policy_id,
                    policy.permissions,
                    op.as_char()
                ),
            ));
        }

        Ok(())
    }

    /// Issues a token bound to a stored policy of `container`.
    pub async fn issue_token(&self, container: &str, policy_id: &str) -> StorageResult<String> {
        let policies = self.get_policies(container).await?;
        if !policies.iter().any(|p| p.id == policy_id) {
            return Err(StorageError::with_message(
                ErrorCode::PolicyNotFound,
                format!("No access policy '{}' on container {}", policy_id, container),
            ));
        }

        let token = SasToken::sign(container, policy_id, &self.config().account_key)?;
        debug!("Issued token for {} policy {}", container, policy_id);
        Ok(token.to_query_string())
    }

    /// Verifies a token and checks the policy it is bound to.
    pub async fn authorize_token(
        &self,
        token: &str,
        container: &str,
        op: Permission,
        now: DateTime<Utc>,
    ) -> StorageResult<()> {
        let token = SasToken::parse(token)?;
        token.verify(&self.config().account_key)?;

        if token.container != container {
            return Err(StorageError::with_message(
                ErrorCode::PermissionDenied,
                format!("Token is bound to container {}", token.container),
            ));
        }

        self.authorize(container, &token.policy_id, op, now).await
    }
}
