use crate::agent::ActorDefinition;
use crate::error::AgentError;
use crate::state::{Snapshot, StateDelta};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;

// ─── Narrative capability ───────────────────────────────────────────────────

/// Everything one agent task hands to the generation step. The snapshot is
/// read-only for the whole round.
pub struct NarrativeRequest<'a> {
    pub actor: &'a ActorDefinition,
    pub snapshot: &'a Snapshot,
    pub instruction: &'a str,
}

/// What the generation step proposes: narrative text plus a state delta.
/// Nothing here is persisted; the committer decides what lands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NarrativeReply {
    pub narrative: String,
    #[serde(default)]
    pub state_delta: StateDelta,
    #[serde(default)]
    pub attribute_delta: Map<String, Value>,
}

/// External narrative-generation capability. The engine is agnostic to its
/// internal prompting; it only sees this contract and a per-task timeout.
pub trait NarrativeProvider: Send + Sync {
    /// Provider identifier for logs (e.g. "deepseek", "openai").
    fn name(&self) -> &str;

    /// One actor's reaction to the instruction.
    fn narrate<'a>(
        &'a self,
        request: NarrativeRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<NarrativeReply>> + Send + 'a>>;

    /// Free-form answer for informational queries (the gated round path).
    fn answer<'a>(
        &'a self,
        question: &'a str,
        snapshot: &'a Snapshot,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>>;
}

// ─── Reply parsing ──────────────────────────────────────────────────────────

/// Parse a raw model reply into a `NarrativeReply`. Generation backends tend
/// to wrap JSON in markdown fences, so those are stripped first. Returns
/// `MalformedReply` when no JSON object can be recovered.
pub fn parse_reply(raw: &str) -> Result<NarrativeReply, AgentError> {
    let body = extract_json_block(raw);
    serde_json::from_str(body).map_err(|error| AgentError::MalformedReply {
        message: error.to_string(),
    })
}

fn extract_json_block(raw: &str) -> &str {
    let trimmed = raw.trim();
    for fence in ["```json", "```"] {
        if let Some(start) = trimmed.find(fence) {
            let rest = &trimmed[start + fence.len()..];
            if let Some(end) = rest.find("```") {
                return rest[..end].trim();
            }
        }
    }
    trimmed
}
