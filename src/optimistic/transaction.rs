//! Snapshot, speculative apply, then commit or revert.

use tracing::debug;

/// Where a mutation is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    /// Local change applied, network call not yet issued
    Speculative,
    /// Network call outstanding
    Confirming,
    /// Server accepted the change
    Committed,
    /// Server rejected the change; snapshot restored
    RolledBack,
}

// == Mutation Transaction ==
/// One optimistic change to a displayed list.
///
/// Owns the snapshot it was started with, so overlapping mutations each keep
/// their own restore target. Finishing consumes the transaction.
#[derive(Debug)]
pub struct MutationTransaction<T> {
    operation: &'static str,
    snapshot: Vec<T>,
    phase: MutationPhase,
}

impl<T: Clone> MutationTransaction<T> {
    /// Copies `items`, then applies `speculate` to them in place.
    pub fn begin(
        operation: &'static str,
        items: &mut Vec<T>,
        speculate: impl FnOnce(&mut Vec<T>),
    ) -> Self {
        let snapshot = items.clone();
        speculate(items);
        debug!("{}: speculative state applied", operation);

        Self {
            operation,
            snapshot,
            phase: MutationPhase::Speculative,
        }
    }

    /// Marks the network call as issued.
    pub fn confirming(&mut self) {
        self.phase = MutationPhase::Confirming;
    }

    pub fn phase(&self) -> MutationPhase {
        self.phase
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// State the list had before this mutation.
    pub fn snapshot(&self) -> &[T] {
        &self.snapshot
    }

    /// Keeps the speculative state, letting `reconcile` swap in authoritative
    /// data. The snapshot is discarded.
    pub fn commit(self, items: &mut Vec<T>, reconcile: impl FnOnce(&mut Vec<T>)) -> MutationPhase {
        reconcile(items);
        debug!("{}: committed", self.operation);
        MutationPhase::Committed
    }

    /// Restores the snapshot verbatim.
    pub fn rollback(self, items: &mut Vec<T>) -> MutationPhase {
        *items = self.snapshot;
        debug!("{}: rolled back", self.operation);
        MutationPhase::RolledBack
    }
}
