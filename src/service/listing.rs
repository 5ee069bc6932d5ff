//! Listing engine: paged, prefix-filtered, delimiter-grouped enumeration of
//! the blobs in a container.
//!
//! A listing is lazy. Each call to [`BlobListing::next_page`] reads the
//! container as it is while the page is read. Entries come out in strictly
//! increasing key order, so nothing is repeated even when blobs are created
//! or deleted meanwhile. Where the next page begins is captured by an opaque
//! continuation token that can be handed to a later
//! [`BlobService::list_blobs`] call, possibly from another process sharing
//! the same storage.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use futures::stream::{self, Stream, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::ops::Bound;
use tracing::debug;

use super::BlobService;
use crate::error::{ErrorCode, StorageError, StorageResult};

/// Parameters of a listing.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Only names starting with this prefix are listed.
    pub prefix: Option<String>,
    /// Groups names sharing the text up to the first delimiter after the
    /// prefix into a single [`ListEntry::Prefix`].
    pub delimiter: Option<String>,
    /// Maximum entries per page; defaults to the configured page size.
    pub page_size: Option<u32>,
    /// Token returned by a previous page.
    pub continuation: Option<String>,
}

impl ListOptions {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            ..Self::default()
        }
    }

    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn continuation(mut self, token: impl Into<String>) -> Self {
        self.continuation = Some(token.into());
        self
    }
}

/// One item of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ListEntry {
    Blob {
        name: String,
        etag: String,
        length: u64,
    },
    Prefix {
        prefix: String,
    },
}

impl ListEntry {
    /// The blob name or grouped prefix.
    pub fn key(&self) -> &str {
        match self {
            ListEntry::Blob { name, .. } => name,
            ListEntry::Prefix { prefix } => prefix,
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    pub entries: Vec<ListEntry>,
    /// Present when more entries follow.
    pub continuation: Option<String>,
}

/// Decoded continuation token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Cursor {
    container: String,
    incarnation: String,
    prefix: String,
    delimiter: Option<String>,
    last: String,
    last_was_prefix: bool,
}

impl Cursor {
    fn encode(&self) -> StorageResult<String> {
        let json = serde_json::to_vec(self).map_err(|e| {
            StorageError::with_message(ErrorCode::InternalError, format!("Failed to encode cursor: {}", e))
        })?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    fn decode(token: &str) -> StorageResult<Self> {
        let invalid = || StorageError::new(ErrorCode::InvalidContinuationToken);
        let json = URL_SAFE_NO_PAD.decode(token).map_err(|_| invalid())?;
        serde_json::from_slice(&json).map_err(|_| invalid())
    }
}

/// Position after the last emitted entry.
#[derive(Debug, Clone)]
struct Position {
    last: String,
    last_was_prefix: bool,
}

/// A lazy listing over one container.
pub struct BlobListing {
    service: BlobService,
    container: String,
    incarnation: String,
    prefix: String,
    delimiter: Option<String>,
    page_size: usize,
    position: Option<Position>,
    exhausted: bool,
}

impl BlobListing {
    /// Reads the next page, or `None` once the listing is exhausted. The
    /// first call always yields a page, empty for an empty container.
    pub async fn next_page(&mut self) -> StorageResult<Option<ListPage>> {
        if self.exhausted {
            return Ok(None);
        }

        let service = self.service.clone();
        let page = service.timed("list_blobs", self.read_page()).await?;
        Ok(Some(page))
    }

    /// Yields every remaining entry one by one, fetching pages on demand.
    pub fn into_stream(self) -> impl Stream<Item = StorageResult<ListEntry>> {
        stream::try_unfold(self, |mut listing| async move {
            let page = listing.next_page().await?;
            Ok::<_, StorageError>(page.map(|page| {
                let entries = stream::iter(page.entries.into_iter().map(Ok::<_, StorageError>));
                (entries, listing)
            }))
        })
        .try_flatten()
    }

    /// Collects every remaining entry.
    pub async fn collect_all(self) -> StorageResult<Vec<ListEntry>> {
        self.into_stream().try_collect().await
    }

    async fn read_page(&mut self) -> StorageResult<ListPage> {
        let container = self.service.existing_container(&self.container).await?;
        if container.incarnation != self.incarnation {
            // Deleted and recreated since the listing started.
            return Err(StorageError::new(ErrorCode::InvalidContinuationToken));
        }

        let mut entries = Vec::new();
        let mut position = self.position.clone();
        let mut more = false;

        // Names are read in runs of at most one page plus one, and records
        // only for the blobs emitted. A grouped prefix ends the run and the
        // next one starts after every name under it.
        'fill: while let Some(from) = resume_point(position.as_ref()) {
            let wanted = self.page_size - entries.len() + 1;
            let names = self
                .service
                .metadata()
                .list_blob_names(&self.container, &self.prefix, as_str_bound(&from), wanted)
                .await;
            let fetched = names.len();

            for name in names {
                if entries.len() == self.page_size {
                    more = true;
                    break 'fill;
                }

                let entry = match self.group_prefix(&name) {
                    Some(prefix) => ListEntry::Prefix { prefix },
                    None => match self.service.metadata().get_blob(&self.container, &name).await {
                        Ok(blob) => ListEntry::Blob {
                            etag: blob.properties.etag,
                            length: blob.properties.content_length,
                            name: blob.name,
                        },
                        Err(e) if e.code == ErrorCode::BlobNotFound => {
                            // Deleted since its name was read.
                            position = Some(Position {
                                last: name,
                                last_was_prefix: false,
                            });
                            continue;
                        }
                        Err(e) => return Err(e),
                    },
                };

                let grouped = matches!(entry, ListEntry::Prefix { .. });
                position = Some(Position {
                    last: entry.key().to_string(),
                    last_was_prefix: grouped,
                });
                entries.push(entry);
                if grouped {
                    continue 'fill;
                }
            }

            if fetched < wanted {
                break;
            }
        }

        self.position = position;
        self.exhausted = !more;

        let continuation = match (&self.position, more) {
            (Some(position), true) => Some(self.cursor(position).encode()?),
            _ => None,
        };

        debug!(
            "Listed {} entries of {} (prefix {:?}, more: {})",
            entries.len(),
            self.container,
            self.prefix,
            more
        );
        Ok(ListPage {
            entries,
            continuation,
        })
    }

    /// The grouped prefix `name` falls under, if a delimiter applies.
    fn group_prefix(&self, name: &str) -> Option<String> {
        let delimiter = self.delimiter.as_deref().filter(|d| !d.is_empty())?;
        let rest = &name[self.prefix.len()..];
        rest.find(delimiter)
            .map(|idx| name[..self.prefix.len() + idx + delimiter.len()].to_string())
    }

    fn cursor(&self, position: &Position) -> Cursor {
        Cursor {
            container: self.container.clone(),
            incarnation: self.incarnation.clone(),
            prefix: self.prefix.clone(),
            delimiter: self.delimiter.clone(),
            last: position.last.clone(),
            last_was_prefix: position.last_was_prefix,
        }
    }
}

/// Where reading resumes after `position`, or `None` when nothing can follow.
fn resume_point(position: Option<&Position>) -> Option<Bound<String>> {
    match position {
        None => Some(Bound::Unbounded),
        Some(Position {
            last,
            last_was_prefix: false,
        }) => Some(Bound::Excluded(last.clone())),
        Some(Position {
            last,
            last_was_prefix: true,
        }) => past_group(last).map(Bound::Included),
    }
}

/// The smallest string sorting after every string that starts with `group`.
fn past_group(group: &str) -> Option<String> {
    let mut chars: Vec<char> = group.chars().collect();
    while let Some(last) = chars.pop() {
        if let Some(next) = (last as u32 + 1..=char::MAX as u32).find_map(char::from_u32) {
            chars.push(next);
            return Some(chars.into_iter().collect());
        }
    }
    None
}

fn as_str_bound(bound: &Bound<String>) -> Bound<&str> {
    match bound {
        Bound::Included(key) => Bound::Included(key.as_str()),
        Bound::Excluded(key) => Bound::Excluded(key.as_str()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

impl BlobService {
    /// Starts a listing of `container`. A continuation token is checked here,
    /// before any page is read.
    pub async fn list_blobs(
        &self,
        container: &str,
        options: ListOptions,
    ) -> StorageResult<BlobListing> {
        let page_size = match options.page_size {
            Some(0) => {
                return Err(StorageError::with_message(
                    ErrorCode::InvalidInput,
                    "Page size must be greater than zero",
                ))
            }
            Some(n) => n as usize,
            None => self.config().default_page_size as usize,
        };

        let model = self
            .timed("list_blobs", self.existing_container(container))
            .await?;
        let prefix = options.prefix.unwrap_or_default();
        let delimiter = options.delimiter.filter(|d| !d.is_empty());

        let position = match options.continuation.as_deref() {
            None | Some("") => None,
            Some(token) => {
                let cursor = Cursor::decode(token)?;
                if cursor.container != model.name
                    || cursor.incarnation != model.incarnation
                    || cursor.prefix != prefix
                    || cursor.delimiter != delimiter
                {
                    debug!("Rejected continuation token for {}", container);
                    return Err(StorageError::new(ErrorCode::InvalidContinuationToken));
                }
                Some(Position {
                    last: cursor.last,
                    last_was_prefix: cursor.last_was_prefix,
                })
            }
        };

        Ok(BlobListing {
            service: self.clone(),
            container: model.name,
            incarnation: model.incarnation,
            prefix,
            delimiter,
            page_size,
            position,
            exhausted: false,
        })
    }
}
