use crate::error::AgentError;
use crate::provider::{NarrativeProvider, NarrativeRequest};
use crate::state::{Snapshot, StateDelta};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::warn;

// ─── Actor definition ───────────────────────────────────────────────────────

/// The character card behind one agent: identity, persona and baseline
/// attributes. Definition files themselves are managed outside the engine;
/// this is the shape the engine consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorDefinition {
    pub id: String,
    pub name: String,
    /// Free-form persona / background text fed to the narrative capability.
    #[serde(default)]
    pub persona: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl ActorDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            persona: String::new(),
            attributes: Map::new(),
        }
    }
}

// ─── Agent outcome ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Ok,
    Failed,
}

/// The single result of one agent task: produced once per actor per batch,
/// never mutated afterwards. A failed outcome carries the typed error and an
/// empty delta; failed actors contribute nothing to the commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutcome {
    pub actor_id: String,
    pub actor_name: String,
    pub status: OutcomeStatus,
    pub narrative: String,
    #[serde(default)]
    pub state_delta: StateDelta,
    #[serde(default)]
    pub attribute_delta: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AgentError>,
}

impl AgentOutcome {
    pub fn succeeded(
        actor: &ActorDefinition,
        narrative: String,
        state_delta: StateDelta,
        attribute_delta: Map<String, Value>,
    ) -> Self {
        Self {
            actor_id: actor.id.clone(),
            actor_name: actor.name.clone(),
            status: OutcomeStatus::Ok,
            narrative,
            state_delta,
            attribute_delta,
            error: None,
        }
    }

    pub fn failed(actor: &ActorDefinition, error: AgentError) -> Self {
        Self {
            actor_id: actor.id.clone(),
            actor_name: actor.name.clone(),
            status: OutcomeStatus::Failed,
            narrative: String::new(),
            state_delta: StateDelta::default(),
            attribute_delta: Map::new(),
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == OutcomeStatus::Ok
    }
}

// ─── Agent task ─────────────────────────────────────────────────────────────

/// One pure computation: (actor, snapshot, instruction) → outcome. Reads the
/// snapshot only, talks to no other task, persists nothing; all side effects
/// are deferred to the committer. Errors are absorbed into a failed outcome
/// so one actor can never abort the batch.
pub async fn run_agent_task(
    provider: &dyn NarrativeProvider,
    actor: &ActorDefinition,
    snapshot: &Snapshot,
    instruction: &str,
    timeout: Duration,
) -> AgentOutcome {
    let request = NarrativeRequest {
        actor,
        snapshot,
        instruction,
    };

    let result = tokio::time::timeout(timeout, provider.narrate(request)).await;
    match result {
        Ok(Ok(reply)) => AgentOutcome::succeeded(
            actor,
            reply.narrative,
            reply.state_delta,
            reply.attribute_delta,
        ),
        Ok(Err(error)) => {
            let agent_error = match error.downcast::<AgentError>() {
                Ok(typed) => typed,
                Err(other) => AgentError::Upstream {
                    message: other.to_string(),
                },
            };
            warn!(actor_id = %actor.id, error = %agent_error, "agent task failed");
            AgentOutcome::failed(actor, agent_error)
        }
        Err(_) => {
            let secs = timeout.as_secs();
            warn!(actor_id = %actor.id, secs, "agent task timed out");
            AgentOutcome::failed(actor, AgentError::Timeout { secs })
        }
    }
}
