pub mod merge;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

// ─── Actor state ─────────────────────────────────────────────────────────────

/// Player-visible portion of an actor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurfaceState {
    /// What the player (and other actors) perceive about this actor.
    #[serde(default)]
    pub perceived_state: String,
}

/// Internal-only portion of an actor. Never copied into a surface payload
/// except through an explicit surface patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HiddenState {
    /// Objective observer notes about the actor's real condition.
    #[serde(default)]
    pub observer_state: String,
    /// The actor's private train of thought.
    #[serde(default)]
    pub inner_monologue: String,
}

/// Full per-actor state owned by the snapshot that contains it. Mutated only
/// by the committer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActorState {
    #[serde(default)]
    pub surface: SurfaceState,
    #[serde(default)]
    pub hidden: HiddenState,
    /// Open structural mapping for duck-typed attributes (vitals, equipment,
    /// quest flags). Merge-by-key, no fixed schema.
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

// ─── Actor patches ───────────────────────────────────────────────────────────

/// Partial update to an actor's surface/hidden panels. An omitted field
/// leaves the parent's value unchanged; a present field overwrites it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    #[serde(default)]
    pub surface: SurfacePatch,
    #[serde(default)]
    pub hidden: HiddenPatch,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurfacePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perceived_state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HiddenPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observer_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_monologue: Option<String>,
}

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        self.surface.perceived_state.is_none()
            && self.hidden.observer_state.is_none()
            && self.hidden.inner_monologue.is_none()
    }
}

// ─── Environment state ──────────────────────────────────────────────────────

/// One event in the append-only environment log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    /// Free-form category, e.g. "event_triggered" or "scene_transition".
    pub kind: String,
    pub description: String,
    pub recorded_at: String,
}

impl EventRecord {
    pub fn new(kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: format!("event_{}", uuid::Uuid::new_v4().simple()),
            kind: kind.into(),
            description: description.into(),
            recorded_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Scene-level state, one instance per world per snapshot. Surface and hidden
/// panels are open mappings (location, time, narrative, connected scenes,
/// risk hints); the event log only ever grows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentState {
    #[serde(default)]
    pub surface: Map<String, Value>,
    #[serde(default)]
    pub hidden: Map<String, Value>,
    #[serde(default)]
    pub event_log: Vec<EventRecord>,
}

// ─── Snapshot ───────────────────────────────────────────────────────────────

/// One immutable, fully materialized world state. Every actor in the roster
/// at commit time has an entry; a snapshot is never a diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub step_id: u64,
    pub parent_step_id: Option<u64>,
    /// BTreeMap so serialization and iteration are deterministic.
    pub actors: BTreeMap<String, ActorState>,
    pub environment: EnvironmentState,
    pub created_at: String,
}

impl Snapshot {
    /// Root of a world's chain: step 0, no parent.
    pub fn genesis(actors: BTreeMap<String, ActorState>, environment: EnvironmentState) -> Self {
        Self {
            step_id: 0,
            parent_step_id: None,
            actors,
            environment,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    /// Structural equality ignoring `created_at` (and event timestamps stay
    /// part of the comparison because they travel inside the delta).
    pub fn same_state_as(&self, other: &Self) -> bool {
        self.step_id == other.step_id
            && self.parent_step_id == other.parent_step_id
            && self.actors == other.actors
            && self.environment == other.environment
    }
}
