//! Environment evaluation after each agent batch.
//!
//! The director walks a fixed phase sequence per round: analyze the batch,
//! decide on an environment reaction, hand the validated delta to the
//! committer.
//! The classifier behind it is an external capability; when it fails, the
//! round degrades to "no change" rather than aborting.

use crate::aggregate::SurfaceView;
use crate::state::{EventRecord, Snapshot};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, warn};

// ─── Decisions ──────────────────────────────────────────────────────────────

/// What the environment does in reaction to a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum EnvironmentDecision {
    NoChange,
    EventTriggered,
    SceneTransition { target: String },
}

/// An event the classifier wants recorded; ids and timestamps are minted at
/// commit time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    #[serde(default)]
    pub kind: String,
    pub description: String,
}

/// Raw classifier verdict before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneJudgement {
    pub decision: EnvironmentDecision,
    #[serde(default)]
    pub surface_patch: Map<String, Value>,
    #[serde(default)]
    pub hidden_patch: Map<String, Value>,
    #[serde(default)]
    pub new_events: Vec<EventDraft>,
    /// Attribute changes the environment inflicts on individual actors
    /// (damage from a triggered hazard, exposure, and the like), keyed by
    /// actor id.
    #[serde(default)]
    pub actor_attributes: BTreeMap<String, Map<String, Value>>,
    /// In-world time the round consumed, in minutes.
    #[serde(default)]
    pub elapsed_minutes: u64,
}

/// Validated environment contribution to the next snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentDelta {
    pub decision: EnvironmentDecision,
    pub surface_patch: Map<String, Value>,
    pub hidden_patch: Map<String, Value>,
    pub new_events: Vec<EventRecord>,
    pub actor_attributes: BTreeMap<String, Map<String, Value>>,
    pub elapsed_minutes: u64,
    /// True when the classifier failed or proposed something invalid and the
    /// delta was downgraded to a safe no-op.
    pub degraded: bool,
}

impl EnvironmentDelta {
    fn no_change(degraded: bool) -> Self {
        Self {
            decision: EnvironmentDecision::NoChange,
            surface_patch: Map::new(),
            hidden_patch: Map::new(),
            new_events: Vec::new(),
            actor_attributes: BTreeMap::new(),
            elapsed_minutes: 0,
            degraded,
        }
    }
}

// ─── Classifier capability ──────────────────────────────────────────────────

/// External scene-evaluation capability, typically model-backed.
pub trait SceneClassifier: Send + Sync {
    fn name(&self) -> &str;

    fn classify<'a>(
        &'a self,
        snapshot: &'a Snapshot,
        surface_view: &'a SurfaceView,
        instruction: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<SceneJudgement>> + Send + 'a>>;
}

// ─── Director ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Analyzing,
    Deciding,
    Committed,
}

pub struct Director {
    classifier: Arc<dyn SceneClassifier>,
}

impl Director {
    pub fn new(classifier: Arc<dyn SceneClassifier>) -> Self {
        Self { classifier }
    }

    /// Evaluate one round. Never errors: any classifier failure or invalid
    /// proposal collapses to a degraded no-change delta.
    pub async fn evaluate(
        &self,
        snapshot: &Snapshot,
        surface_view: &SurfaceView,
        instruction: &str,
    ) -> EnvironmentDelta {
        let mut phase = Phase::Analyzing;
        debug!(classifier = self.classifier.name(), ?phase, "director pass started");

        let judgement = match self
            .classifier
            .classify(snapshot, surface_view, instruction)
            .await
        {
            Ok(judgement) => judgement,
            Err(error) => {
                warn!(%error, "scene classifier failed, degrading to no change");
                return EnvironmentDelta::no_change(true);
            }
        };

        phase = Phase::Deciding;
        debug!(?phase, decision = ?judgement.decision, "classifier verdict received");
        let delta = self.validate(snapshot, judgement);

        phase = Phase::Committed;
        debug!(?phase, degraded = delta.degraded, "director pass finished");
        delta
    }

    fn validate(&self, snapshot: &Snapshot, judgement: SceneJudgement) -> EnvironmentDelta {
        let SceneJudgement {
            decision,
            mut surface_patch,
            hidden_patch,
            new_events,
            actor_attributes,
            elapsed_minutes,
        } = judgement;

        let mut events: Vec<EventRecord> = new_events
            .into_iter()
            .map(|draft| {
                let kind = if draft.kind.is_empty() {
                    "event_triggered".to_string()
                } else {
                    draft.kind
                };
                EventRecord::new(kind, draft.description)
            })
            .collect();

        let decision = match decision {
            EnvironmentDecision::SceneTransition { target } => {
                if !transition_allowed(&snapshot.environment.surface, &target) {
                    warn!(%target, "scene transition target not connected, degrading to no change");
                    return EnvironmentDelta {
                        elapsed_minutes,
                        ..EnvironmentDelta::no_change(true)
                    };
                }
                surface_patch.insert("location".into(), Value::String(target.clone()));
                events.push(EventRecord::new(
                    "scene_transition",
                    format!("The scene shifts to {target}."),
                ));
                EnvironmentDecision::SceneTransition { target }
            }
            other => other,
        };

        EnvironmentDelta {
            decision,
            surface_patch,
            hidden_patch,
            new_events: events,
            actor_attributes,
            elapsed_minutes,
            degraded: false,
        }
    }
}

/// A transition is allowed when the scene declares no `connected_scenes`
/// list at all, or when the target appears in it.
fn transition_allowed(surface: &Map<String, Value>, target: &str) -> bool {
    match surface.get("connected_scenes") {
        None => true,
        Some(Value::Array(connected)) => connected
            .iter()
            .any(|scene| scene.as_str() == Some(target)),
        Some(_) => false,
    }
}
