//! The single mutation point of a round.
//!
//! Everything before this module proposes; the committer disposes. It folds
//! the accepted actor deltas and the environment delta onto the base snapshot,
//! writes the child, and advances the current pointer. Failed actors are
//! copied forward unchanged, so a partially failed round still yields a
//! complete snapshot.

use crate::agent::ActorDefinition;
use crate::aggregate::HiddenView;
use crate::director::{EnvironmentDecision, EnvironmentDelta};
use crate::error::StoreError;
use crate::state::merge::{apply_actor_delta, merge_attribute_deltas, merge_map};
use crate::state::{Snapshot, StateDelta};
use crate::store::SnapshotStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::info;

/// Surface key that accumulates in-world elapsed time.
pub const GAME_TIME_KEY: &str = "game_time_minutes";

/// What one commit did, for the caller and the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub base_step_id: u64,
    pub resulting_step_id: u64,
    /// Actors whose deltas landed.
    pub accepted: Vec<String>,
    /// Actors carried forward unchanged (failed or absent from the batch).
    pub rejected: Vec<String>,
    pub decision: EnvironmentDecision,
    pub degraded: bool,
}

/// Build and persist the child snapshot of `base_step_id`.
///
/// Fails with `CommitConflict` when the world's current pointer moved past
/// the base in the meantime; nothing is written in that case.
pub fn commit_round(
    store: &dyn SnapshotStore,
    world: &str,
    base_step_id: u64,
    roster: &[ActorDefinition],
    hidden: &HiddenView,
    env_delta: &EnvironmentDelta,
) -> Result<CommitRecord, StoreError> {
    let current = store.get_current(world)?;
    if current != base_step_id {
        return Err(StoreError::CommitConflict {
            world: world.to_string(),
            base: base_step_id,
            current,
        });
    }

    let parent = store.load_snapshot(world, base_step_id)?;
    let empty_delta = StateDelta::default();
    let empty_attributes = Map::new();

    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    let mut actors = parent.actors.clone();
    for actor in roster {
        let Some(parent_state) = parent.actors.get(&actor.id) else {
            continue;
        };

        let agent_attributes = hidden.attribute_deltas.get(&actor.id);
        let director_attributes = env_delta.actor_attributes.get(&actor.id);
        if agent_attributes.is_none() && director_attributes.is_none() {
            rejected.push(actor.id.clone());
            continue;
        }

        let combined_attributes = merge_attribute_deltas(
            agent_attributes.unwrap_or(&empty_attributes),
            director_attributes.unwrap_or(&empty_attributes),
        );
        let delta = hidden.state_deltas.get(&actor.id).unwrap_or(&empty_delta);
        actors.insert(
            actor.id.clone(),
            apply_actor_delta(parent_state, delta, &combined_attributes),
        );
        accepted.push(actor.id.clone());
    }

    let mut environment = parent.environment.clone();
    merge_map(&mut environment.surface, &env_delta.surface_patch);
    merge_map(&mut environment.hidden, &env_delta.hidden_patch);
    environment.event_log.extend(env_delta.new_events.iter().cloned());
    if env_delta.elapsed_minutes > 0 {
        let elapsed_so_far = environment
            .surface
            .get(GAME_TIME_KEY)
            .and_then(Value::as_u64)
            .unwrap_or(0);
        environment.surface.insert(
            GAME_TIME_KEY.into(),
            json!(elapsed_so_far + env_delta.elapsed_minutes),
        );
    }

    let child = Snapshot {
        step_id: base_step_id + 1,
        parent_step_id: Some(base_step_id),
        actors,
        environment,
        created_at: Utc::now().to_rfc3339(),
    };

    let resulting_step_id = store.write_snapshot(world, &child)?;
    store.set_current(world, resulting_step_id)?;
    info!(
        world,
        base_step_id,
        resulting_step_id,
        accepted = accepted.len(),
        rejected = rejected.len(),
        "round committed"
    );

    Ok(CommitRecord {
        base_step_id,
        resulting_step_id,
        accepted,
        rejected,
        decision: env_delta.decision.clone(),
        degraded: env_delta.degraded,
    })
}
