//! Lock tables serializing container transitions and per-key blob mutations.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Number of blob lock stripes (must be power of 2).
const NUM_STRIPES: usize = 64;

type Gates = DashMap<Arc<str>, Arc<RwLock<()>>>;

/// Container gates and striped blob locks.
///
/// Lock order is always container gate first, then blob stripe. No task
/// holds two stripes at once.
pub(crate) struct LockTable {
    /// Per-container gate: exclusive for state transitions and policy
    /// replacement, shared for blob writes. Only gates that are held or
    /// awaited stay in the table.
    containers: Arc<Gates>,
    /// Blob key stripes: exclusive for mutations, shared for reads.
    stripes: Vec<Arc<RwLock<()>>>,
}

/// A held container gate.
///
/// Dropping it releases the gate and removes it from the table when no
/// other task holds or waits for it.
pub(crate) struct GateGuard {
    held: Option<Held>,
    gate: Arc<RwLock<()>>,
    gates: Arc<Gates>,
    name: Arc<str>,
}

enum Held {
    Shared { _guard: OwnedRwLockReadGuard<()> },
    Exclusive { _guard: OwnedRwLockWriteGuard<()> },
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        drop(self.held.take());
        // One reference is the table's, one is ours.
        self.gates.remove_if(&*self.name, |_, gate| {
            Arc::ptr_eq(gate, &self.gate) && Arc::strong_count(gate) == 2
        });
    }
}

impl LockTable {
    pub(crate) fn new() -> Self {
        Self {
            containers: Arc::new(DashMap::new()),
            stripes: (0..NUM_STRIPES).map(|_| Arc::new(RwLock::new(()))).collect(),
        }
    }

    /// Holds the gate of a container shared.
    pub(crate) async fn shared(&self, name: &str) -> GateGuard {
        let mut guard = self.unheld(name);
        let guard_lock = {
            let gate = guard.gate.clone();
            gate.read_owned().await
        };
        guard.held = Some(Held::Shared { _guard: guard_lock });
        guard
    }

    /// Holds the gate of a container exclusively.
    pub(crate) async fn exclusive(&self, name: &str) -> GateGuard {
        let mut guard = self.unheld(name);
        let guard_lock = {
            let gate = guard.gate.clone();
            gate.write_owned().await
        };
        guard.held = Some(Held::Exclusive { _guard: guard_lock });
        guard
    }

    /// Registers interest in a gate, creating it on first use. The returned
    /// guard cleans up after itself even if the wait for the lock is dropped.
    fn unheld(&self, name: &str) -> GateGuard {
        let gate = self
            .containers
            .entry(Arc::from(name))
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .value()
            .clone();
        GateGuard {
            held: None,
            gate,
            gates: self.containers.clone(),
            name: Arc::from(name),
        }
    }

    /// Returns the stripe guarding a (container, blob) key.
    pub(crate) fn blob(&self, container: &str, name: &str) -> &Arc<RwLock<()>> {
        let hash = container
            .bytes()
            .chain(std::iter::once(b'/'))
            .chain(name.bytes())
            .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
        &self.stripes[hash % NUM_STRIPES]
    }

    /// Number of container gates currently tracked.
    #[cfg(test)]
    pub(crate) fn gate_count(&self) -> usize {
        self.containers.len()
    }
}
