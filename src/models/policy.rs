//! Stored access policy models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ErrorCode, StorageError, StorageResult};

/// Maximum length of a policy identifier.
pub const MAX_POLICY_ID_LEN: usize = 64;

/// An operation that can be granted by an access policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    Read,
    Write,
    Delete,
    List,
}

impl Permission {
    pub const ALL: [Permission; 4] = [
        Permission::Read,
        Permission::Write,
        Permission::Delete,
        Permission::List,
    ];

    pub fn as_char(&self) -> char {
        match self {
            Permission::Read => 'r',
            Permission::Write => 'w',
            Permission::Delete => 'd',
            Permission::List => 'l',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'r' => Some(Permission::Read),
            'w' => Some(Permission::Write),
            'd' => Some(Permission::Delete),
            'l' => Some(Permission::List),
            _ => None,
        }
    }

    fn bit(&self) -> u8 {
        match self {
            Permission::Read => 0b0001,
            Permission::Write => 0b0010,
            Permission::Delete => 0b0100,
            Permission::List => 0b1000,
        }
    }
}

/// A set of permissions, written as a subset of `"rwdl"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permissions(u8);

impl Permissions {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        Permission::ALL.iter().copied().collect()
    }

    pub fn with(mut self, permission: Permission) -> Self {
        self.0 |= permission.bit();
        self
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.0 & permission.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Parses a permission string such as `"rw"`. Order does not matter.
    pub fn parse(s: &str) -> StorageResult<Self> {
        s.chars()
            .map(|c| {
                Permission::from_char(c).ok_or_else(|| {
                    StorageError::with_message(
                        ErrorCode::InvalidInput,
                        format!("Unknown permission '{}'", c),
                    )
                })
            })
            .collect()
    }
}

impl FromIterator<Permission> for Permissions {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        iter.into_iter().fold(Permissions::empty(), Permissions::with)
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for permission in Permission::ALL {
            if self.contains(permission) {
                write!(f, "{}", permission.as_char())?;
            }
        }
        Ok(())
    }
}

impl TryFrom<String> for Permissions {
    type Error = StorageError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Permissions::parse(&s)
    }
}

impl From<Permissions> for String {
    fn from(p: Permissions) -> Self {
        p.to_string()
    }
}

/// A time- and permission-scoped grant stored on a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    pub id: String,
    pub starts_on: DateTime<Utc>,
    pub expires_on: DateTime<Utc>,
    pub permissions: Permissions,
}

impl AccessPolicy {
    pub fn new(
        id: impl Into<String>,
        starts_on: DateTime<Utc>,
        expires_on: DateTime<Utc>,
        permissions: Permissions,
    ) -> Self {
        Self {
            id: id.into(),
            starts_on,
            expires_on,
            permissions,
        }
    }

    /// Whether `now` falls within `[starts_on, expires_on]`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.starts_on && now <= self.expires_on
    }

    /// Validates the identifier and the time window.
    pub fn validate(&self) -> StorageResult<()> {
        if self.id.is_empty() || self.id.chars().count() > MAX_POLICY_ID_LEN {
            return Err(StorageError::with_message(
                ErrorCode::InvalidInput,
                format!(
                    "Policy id must be between 1 and {} characters",
                    MAX_POLICY_ID_LEN
                ),
            ));
        }
        if self.expires_on <= self.starts_on {
            return Err(StorageError::with_message(
                ErrorCode::InvalidPolicyWindow,
                format!("Policy '{}' expires before it starts", self.id),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_permissions_parse_and_display() {
        let p = Permissions::parse("lwr").unwrap();
        assert!(p.contains(Permission::Read));
        assert!(p.contains(Permission::Write));
        assert!(p.contains(Permission::List));
        assert!(!p.contains(Permission::Delete));
        assert_eq!(p.to_string(), "rwl");
        assert_eq!(Permissions::all().to_string(), "rwdl");
        assert!(Permissions::parse("rx").is_err());
    }

    #[test]
    fn test_permissions_serde_as_string() {
        let p = Permissions::parse("rw").unwrap();
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"rw\"");
        let back: Permissions = serde_json::from_str("\"dr\"").unwrap();
        assert_eq!(back.to_string(), "rd");
    }

    #[test]
    fn test_policy_window() {
        let now = Utc::now();
        let policy = AccessPolicy::new("p", now, now, Permissions::all());
        assert_eq!(policy.validate().unwrap_err().code, ErrorCode::InvalidPolicyWindow);

        let policy = AccessPolicy::new("p", now - Duration::hours(1), now + Duration::days(1), Permissions::all());
        assert!(policy.validate().is_ok());
        assert!(policy.is_active_at(now));
        assert!(!policy.is_active_at(now + Duration::days(2)));
        assert!(!policy.is_active_at(now - Duration::hours(2)));
    }

    #[test]
    fn test_policy_id_length() {
        let now = Utc::now();
        let long = AccessPolicy::new("x".repeat(65), now, now + Duration::hours(1), Permissions::all());
        assert_eq!(long.validate().unwrap_err().code, ErrorCode::InvalidInput);
        let empty = AccessPolicy::new("", now, now + Duration::hours(1), Permissions::all());
        assert_eq!(empty.validate().unwrap_err().code, ErrorCode::InvalidInput);
    }
}
