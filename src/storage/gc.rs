//! Garbage collection for orphaned extents.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, info, warn};

use super::{ExtentStore, MetadataStore};
use crate::error::StorageResult;

/// Garbage collector for cleaning up orphaned extents.
///
/// An upload writes its extent before the record pointing at it, so an
/// unreferenced extent may belong to an upload still in flight. Extents are
/// only deleted once they were found unreferenced on two consecutive passes.
pub struct GarbageCollector {
    metadata: Arc<dyn MetadataStore>,
    extents: Arc<dyn ExtentStore>,
    interval: Duration,
    /// Extents found unreferenced on the previous pass.
    suspects: Mutex<HashSet<String>>,
}

impl GarbageCollector {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        extents: Arc<dyn ExtentStore>,
        interval: Duration,
    ) -> Self {
        Self {
            metadata,
            extents,
            interval,
            suspects: Mutex::new(HashSet::new()),
        }
    }

    /// Starts the garbage collection loop.
    pub async fn run(&self) {
        let mut interval = time::interval(self.interval);

        loop {
            interval.tick().await;
            if let Err(e) = self.collect().await {
                warn!("Garbage collection failed: {}", e);
            }
        }
    }

    /// Performs a single garbage collection pass and returns the number of
    /// extents deleted.
    pub async fn collect(&self) -> StorageResult<usize> {
        debug!("Starting garbage collection");

        // List extents before reading references: an extent committed between
        // the two reads then shows up as referenced.
        let stored = self.extents.list_ids().await;
        let referenced = self.metadata.referenced_extents().await;

        let unreferenced: HashSet<String> = stored
            .into_iter()
            .filter(|id| !referenced.contains(id))
            .collect();

        let doomed: Vec<String> = {
            let mut suspects = self.suspects.lock();
            let doomed = unreferenced.intersection(&suspects).cloned().collect();
            *suspects = unreferenced;
            doomed
        };

        for id in &doomed {
            self.extents.delete(id).await?;
            self.suspects.lock().remove(id);
        }

        if !doomed.is_empty() {
            info!("Garbage collection removed {} orphaned extents", doomed.len());
        }
        Ok(doomed.len())
    }
}
