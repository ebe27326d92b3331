use super::SnapshotStore;
use crate::error::StoreError;
use crate::state::Snapshot;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

struct WorldChain {
    snapshots: BTreeMap<u64, Snapshot>,
    current: u64,
}

/// In-memory snapshot store for tests and ephemeral worlds.
pub struct MemoryStore {
    worlds: Mutex<HashMap<String, WorldChain>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            worlds: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, WorldChain>> {
        self.worlds
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore for MemoryStore {
    fn create_world(&self, world: &str, genesis: Snapshot) -> Result<(), StoreError> {
        let mut worlds = self.lock();
        if worlds.contains_key(world) {
            return Err(StoreError::Backend(format!(
                "world already exists: {world}"
            )));
        }
        let step_id = genesis.step_id;
        let mut snapshots = BTreeMap::new();
        snapshots.insert(step_id, genesis);
        worlds.insert(
            world.to_string(),
            WorldChain {
                snapshots,
                current: step_id,
            },
        );
        Ok(())
    }

    fn load_snapshot(&self, world: &str, step_id: u64) -> Result<Snapshot, StoreError> {
        let worlds = self.lock();
        let chain = worlds
            .get(world)
            .ok_or_else(|| StoreError::WorldNotFound(world.to_string()))?;
        chain
            .snapshots
            .get(&step_id)
            .cloned()
            .ok_or(StoreError::SnapshotNotFound {
                world: world.to_string(),
                step_id,
            })
    }

    fn write_snapshot(&self, world: &str, snapshot: &Snapshot) -> Result<u64, StoreError> {
        let mut worlds = self.lock();
        let chain = worlds
            .get_mut(world)
            .ok_or_else(|| StoreError::WorldNotFound(world.to_string()))?;
        if snapshot.step_id <= chain.current {
            return Err(StoreError::Backend(format!(
                "snapshot {} is committed history in world {world}",
                snapshot.step_id
            )));
        }
        chain.snapshots.insert(snapshot.step_id, snapshot.clone());
        Ok(snapshot.step_id)
    }

    fn get_current(&self, world: &str) -> Result<u64, StoreError> {
        let worlds = self.lock();
        worlds
            .get(world)
            .map(|chain| chain.current)
            .ok_or_else(|| StoreError::WorldNotFound(world.to_string()))
    }

    fn set_current(&self, world: &str, step_id: u64) -> Result<(), StoreError> {
        let mut worlds = self.lock();
        let chain = worlds
            .get_mut(world)
            .ok_or_else(|| StoreError::WorldNotFound(world.to_string()))?;
        if !chain.snapshots.contains_key(&step_id) {
            return Err(StoreError::SnapshotNotFound {
                world: world.to_string(),
                step_id,
            });
        }
        chain.current = step_id;
        Ok(())
    }
}
