pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::state::Snapshot;

/// Persistence collaborator for versioned world state.
///
/// Snapshots are append-only and immutable; history per world is a single
/// linear chain. The "current" pointer names the latest accepted step, and
/// rollback is just repointing it; committed history is never rewritten.
pub trait SnapshotStore: Send + Sync {
    /// Register a world with its genesis snapshot (step 0) and point
    /// "current" at it.
    fn create_world(&self, world: &str, genesis: Snapshot) -> Result<(), StoreError>;

    fn load_snapshot(&self, world: &str, step_id: u64) -> Result<Snapshot, StoreError>;

    /// Append a new snapshot. Steps at or below the current pointer are
    /// committed history and are never overwritten; a step beyond it (a
    /// stale branch left behind by a rollback) is replaced.
    fn write_snapshot(&self, world: &str, snapshot: &Snapshot) -> Result<u64, StoreError>;

    fn get_current(&self, world: &str) -> Result<u64, StoreError>;

    /// Advance (or rewind) the current pointer to an existing step.
    fn set_current(&self, world: &str, step_id: u64) -> Result<(), StoreError>;

    /// Repoint current to an earlier step after verifying it exists.
    fn rollback(&self, world: &str, step_id: u64) -> Result<(), StoreError> {
        self.load_snapshot(world, step_id)?;
        self.set_current(world, step_id)
    }
}
