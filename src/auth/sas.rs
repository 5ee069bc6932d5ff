//! Shared-access tokens bound to a stored access policy.
//!
//! A token names a container and a policy id and carries an HMAC-SHA256
//! signature over both, keyed by the account key. It holds no permissions or
//! validity window of its own: those are read from the stored policy on
//! every check, so editing or removing the policy takes effect immediately.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use sha2::Sha256;
use std::collections::HashMap;

use crate::error::{ErrorCode, StorageError, StorageResult};

type HmacSha256 = Hmac<Sha256>;

/// Token format version.
const TOKEN_VERSION: &str = "1";

/// Parsed shared-access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SasToken {
    /// Signed version (sv).
    pub version: String,
    /// Container the token is bound to (sc).
    pub container: String,
    /// Stored access policy identifier (si).
    pub policy_id: String,
    /// Signature (sig), base64.
    pub signature: String,
}

impl SasToken {
    /// Creates and signs a token for `container` and `policy_id`.
    pub fn sign(container: &str, policy_id: &str, account_key: &str) -> StorageResult<Self> {
        let signature = compute_signature(
            &string_to_sign(TOKEN_VERSION, container, policy_id),
            account_key,
        )?;
        Ok(Self {
            version: TOKEN_VERSION.to_string(),
            container: container.to_string(),
            policy_id: policy_id.to_string(),
            signature,
        })
    }

    /// Parses a token from its query-string form.
    pub fn parse(token: &str) -> StorageResult<Self> {
        let params: HashMap<String, String> = token
            .trim_start_matches('?')
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter_map(|pair| {
                let (key, value) = pair.split_once('=')?;
                let value = percent_decode_str(value).decode_utf8().ok()?;
                Some((key.to_string(), value.to_string()))
            })
            .collect();

        let field = |name: &str| {
            params.get(name).cloned().ok_or_else(|| {
                StorageError::with_message(
                    ErrorCode::AuthenticationFailed,
                    format!("Token is missing '{}'", name),
                )
            })
        };

        let version = field("sv")?;
        if version != TOKEN_VERSION {
            return Err(StorageError::with_message(
                ErrorCode::AuthenticationFailed,
                format!("Unsupported token version '{}'", version),
            ));
        }

        Ok(Self {
            version,
            container: field("sc")?,
            policy_id: field("si")?,
            signature: field("sig")?,
        })
    }

    /// Checks the signature against `account_key`.
    pub fn verify(&self, account_key: &str) -> StorageResult<()> {
        let provided = BASE64
            .decode(&self.signature)
            .map_err(|_| StorageError::with_message(ErrorCode::AuthenticationFailed, "Malformed token signature"))?;

        let mut mac = new_mac(account_key)?;
        mac.update(string_to_sign(&self.version, &self.container, &self.policy_id).as_bytes());
        mac.verify_slice(&provided).map_err(|_| {
            tracing::debug!(
                "Token signature mismatch for container {} policy {}",
                self.container,
                self.policy_id
            );
            StorageError::new(ErrorCode::AuthenticationFailed)
        })
    }

    /// Renders the token in query-string form.
    pub fn to_query_string(&self) -> String {
        let encode = |s: &str| utf8_percent_encode(s, NON_ALPHANUMERIC).to_string();
        format!(
            "sv={}&sc={}&si={}&sig={}",
            encode(&self.version),
            encode(&self.container),
            encode(&self.policy_id),
            encode(&self.signature)
        )
    }
}

fn string_to_sign(version: &str, container: &str, policy_id: &str) -> String {
    [version, container, policy_id].join("\n")
}

fn new_mac(account_key: &str) -> StorageResult<HmacSha256> {
    let key_bytes = BASE64.decode(account_key).map_err(|_| {
        StorageError::with_message(ErrorCode::InternalError, "Invalid account key encoding")
    })?;

    HmacSha256::new_from_slice(&key_bytes)
        .map_err(|_| StorageError::with_message(ErrorCode::InternalError, "Failed to create HMAC"))
}

/// Whether a presented account key equals the configured one. Both are
/// run through the account HMAC and the tags compared in constant time.
pub(crate) fn account_key_matches(presented: &str, account_key: &str) -> StorageResult<bool> {
    let tag = |value: &str| -> StorageResult<HmacSha256> {
        let mut mac = new_mac(account_key)?;
        mac.update(value.as_bytes());
        Ok(mac)
    };
    let expected = tag(account_key)?.finalize().into_bytes();
    Ok(tag(presented)?.verify_slice(&expected).is_ok())
}

/// Computes HMAC-SHA256 signature.
fn compute_signature(string_to_sign: &str, account_key: &str) -> StorageResult<String> {
    let mut mac = new_mac(account_key)?;
    mac.update(string_to_sign.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}
