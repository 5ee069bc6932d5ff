//! Blob events and blob-triggered handlers.
//!
//! The service publishes a [`BlobEvent`] for every container and blob change
//! on a broadcast channel. A [`TriggerDispatcher`] binds path patterns such
//! as `container-trigger-input/{name}` to handlers and invokes them for each
//! matching blob upload.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::error::{ErrorCode, StorageError, StorageResult};
use crate::service::BlobService;

/// A change published by the blob service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobEvent {
    ContainerCreated {
        container: String,
    },
    BlobCreated {
        container: String,
        name: String,
        etag: String,
        length: u64,
    },
    BlobDeleted {
        container: String,
        name: String,
    },
    ContainerDeleted {
        container: String,
    },
}

/// A `container/prefix{name}suffix` pattern selecting blobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobPathPattern {
    container: String,
    prefix: String,
    suffix: String,
}

impl BlobPathPattern {
    /// Parses a pattern. The blob part must contain exactly one `{name}`.
    pub fn parse(pattern: &str) -> StorageResult<Self> {
        let invalid = |reason: &str| {
            StorageError::with_message(
                ErrorCode::InvalidInput,
                format!("Invalid trigger path '{}': {}", pattern, reason),
            )
        };

        let (container, blob) = pattern
            .split_once('/')
            .ok_or_else(|| invalid("expected container/{name}"))?;
        if container.is_empty() {
            return Err(invalid("missing container"));
        }
        let (prefix, suffix) = blob
            .split_once("{name}")
            .ok_or_else(|| invalid("missing {name}"))?;
        if suffix.contains("{name}") {
            return Err(invalid("{name} appears twice"));
        }

        Ok(Self {
            container: container.to_string(),
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        })
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Returns the value bound to `{name}` when the blob matches.
    pub fn bind<'a>(&self, container: &str, blob: &'a str) -> Option<&'a str> {
        if container != self.container {
            return None;
        }
        let rest = blob.strip_prefix(self.prefix.as_str())?;
        let name = rest.strip_suffix(self.suffix.as_str())?;
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }
}

/// A function invoked for each blob matching its binding.
#[async_trait]
pub trait BlobTriggerHandler: Send + Sync {
    /// Handles one blob. `name` is the value bound to `{name}`.
    async fn handle(&self, name: &str, content: Bytes) -> StorageResult<()>;
}

/// Logs each processed blob.
pub struct LoggingTrigger;

#[async_trait]
impl BlobTriggerHandler for LoggingTrigger {
    async fn handle(&self, name: &str, content: Bytes) -> StorageResult<()> {
        info!(
            "Blob trigger processed blob\n Name: {}\n Size: {} Bytes\n Content: {}",
            name,
            content.len(),
            String::from_utf8_lossy(&content)
        );
        Ok(())
    }
}

/// Routes blob uploads to the handlers bound to them.
pub struct TriggerDispatcher {
    service: BlobService,
    events: broadcast::Receiver<BlobEvent>,
    bindings: Vec<(BlobPathPattern, Arc<dyn BlobTriggerHandler>)>,
}

impl TriggerDispatcher {
    /// Creates a dispatcher. Events published from here on are delivered to
    /// [`run`](Self::run).
    pub fn new(service: BlobService) -> Self {
        Self {
            events: service.subscribe(),
            service,
            bindings: Vec::new(),
        }
    }

    /// Binds `pattern` to `handler`.
    pub fn bind(
        mut self,
        pattern: &str,
        handler: Arc<dyn BlobTriggerHandler>,
    ) -> StorageResult<Self> {
        let pattern = BlobPathPattern::parse(pattern)?;
        info!("Bound blob trigger to {}/{}{{name}}{}", pattern.container, pattern.prefix, pattern.suffix);
        self.bindings.push((pattern, handler));
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Processes events until the task is aborted.
    pub async fn run(mut self) {
        loop {
            match self.events.recv().await {
                Ok(event) => self.dispatch(&event).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Blob trigger dispatcher skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    /// Invokes every handler bound to the blob of `event`.
    pub async fn dispatch(&self, event: &BlobEvent) {
        let BlobEvent::BlobCreated { container, name, .. } = event else {
            return;
        };

        for (pattern, handler) in &self.bindings {
            let Some(bound) = pattern.bind(container, name) else {
                continue;
            };

            let content = match self.service.get_blob(container, name).await {
                Ok(download) => download.content,
                Err(e) => {
                    // Deleted or overwritten before we got to it.
                    debug!("Skipping trigger for {}/{}: {}", container, name, e);
                    continue;
                }
            };

            if let Err(e) = handler.handle(bound, content).await {
                warn!("Blob trigger for {}/{} failed: {}", container, name, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_binding() {
        let pattern = BlobPathPattern::parse("container-trigger-input/{name}").unwrap();
        assert_eq!(pattern.bind("container-trigger-input", "a/b.txt"), Some("a/b.txt"));
        assert_eq!(pattern.bind("other", "a.txt"), None);

        let pattern = BlobPathPattern::parse("input/images/{name}.png").unwrap();
        assert_eq!(pattern.bind("input", "images/cat.png"), Some("cat"));
        assert_eq!(pattern.bind("input", "images/cat.jpg"), None);
        assert_eq!(pattern.bind("input", "docs/cat.png"), None);
    }

    #[test]
    fn test_pattern_rejects_malformed() {
        assert!(BlobPathPattern::parse("no-slash").is_err());
        assert!(BlobPathPattern::parse("/{name}").is_err());
        assert!(BlobPathPattern::parse("input/static").is_err());
        assert!(BlobPathPattern::parse("input/{name}/{name}").is_err());
    }
}
