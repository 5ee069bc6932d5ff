//! User-defined metadata with case-insensitive keys.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use crate::error::{ErrorCode, StorageError, StorageResult};

/// Metadata keys must be valid identifiers.
fn key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static pattern"))
}

/// A string-to-string map whose keys are unique ignoring case.
///
/// Inserting a key that differs only in case from an existing one replaces
/// the existing entry, taking the new casing. Lookups ignore case, and two
/// maps compare equal when they hold the same keys (ignoring case) and values,
/// regardless of insertion order.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    /// Lowercased key -> (original key, value).
    entries: BTreeMap<String, (String, String)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry, returning the value it replaced.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        self.entries
            .insert(key.to_ascii_lowercase(), (key, value.into()))
            .map(|(_, old)| old)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries as (key as last inserted, value).
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Checks every key is a non-empty identifier.
    pub fn validate(&self) -> StorageResult<()> {
        for (key, _) in self.iter() {
            if key.is_empty() {
                return Err(StorageError::with_message(
                    ErrorCode::InvalidMetadata,
                    "Metadata keys must not be empty",
                ));
            }
            if !key_pattern().is_match(key) {
                return Err(StorageError::with_message(
                    ErrorCode::InvalidMetadata,
                    format!("Metadata key '{}' is not a valid identifier", key),
                ));
            }
        }
        Ok(())
    }
}

impl PartialEq for Metadata {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .all(|(k, (_, v))| other.entries.get(k).map(|(_, ov)| ov) == Some(v))
    }
}

impl Eq for Metadata {}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Metadata::new();
        for (k, v) in iter {
            metadata.insert(k, v);
        }
        metadata
    }
}

impl From<HashMap<String, String>> for Metadata {
    fn from(map: HashMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

impl Serialize for Metadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let map: BTreeMap<&str, &str> = self.iter().collect();
        map.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = BTreeMap::<String, String>::deserialize(deserializer)?;
        Ok(map.into_iter().collect())
    }
}
