//! Pure projection of a batch of agent outcomes into the two round views.
//!
//! No IO, no locks: the same outcomes in the same roster order always yield
//! the same views. The surface view is what a player may see; the hidden view
//! is operator/committer material and is the only place failures and hidden
//! deltas appear.

use crate::agent::AgentOutcome;
use crate::error::AgentError;
use crate::state::StateDelta;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

// ─── Surface view ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceEntry {
    pub actor_id: String,
    pub actor_name: String,
    pub narrative: String,
}

/// Player-facing projection of a round: successful narratives in roster
/// order plus a combined one-line-per-actor summary. Failed actors simply
/// do not appear here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceView {
    pub entries: Vec<SurfaceEntry>,
    pub summary: String,
}

// ─── Hidden view ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureNote {
    pub actor_id: String,
    pub kind: String,
    pub error: AgentError,
}

/// Operator-facing projection: per-actor state and attribute deltas keyed by
/// actor id, plus every failure with its typed error. Input to the committer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HiddenView {
    pub state_deltas: BTreeMap<String, StateDelta>,
    pub attribute_deltas: BTreeMap<String, Map<String, Value>>,
    pub failures: Vec<FailureNote>,
}

impl HiddenView {
    pub fn failed_actor_ids(&self) -> Vec<String> {
        self.failures
            .iter()
            .map(|note| note.actor_id.clone())
            .collect()
    }
}

// ─── Projection ─────────────────────────────────────────────────────────────

/// Split one batch of outcomes into its surface and hidden views.
///
/// Outcomes must already be in roster order; the projection preserves it.
pub fn project_views(outcomes: &[AgentOutcome], snippet_len: usize) -> (SurfaceView, HiddenView) {
    let mut entries = Vec::new();
    let mut hidden = HiddenView::default();

    for outcome in outcomes {
        if outcome.is_ok() {
            entries.push(SurfaceEntry {
                actor_id: outcome.actor_id.clone(),
                actor_name: outcome.actor_name.clone(),
                narrative: outcome.narrative.clone(),
            });
            hidden
                .state_deltas
                .insert(outcome.actor_id.clone(), outcome.state_delta.clone());
            hidden
                .attribute_deltas
                .insert(outcome.actor_id.clone(), outcome.attribute_delta.clone());
        } else if let Some(error) = &outcome.error {
            hidden.failures.push(FailureNote {
                actor_id: outcome.actor_id.clone(),
                kind: error.kind().to_string(),
                error: error.clone(),
            });
        }
    }

    let summary = entries
        .iter()
        .map(|entry| format!("{}: {}", entry.actor_name, snippet(&entry.narrative, snippet_len)))
        .collect::<Vec<_>>()
        .join("\n");

    (SurfaceView { entries, summary }, hidden)
}

fn snippet(narrative: &str, max_chars: usize) -> String {
    if narrative.chars().count() <= max_chars {
        narrative.to_string()
    } else {
        let truncated: String = narrative.chars().take(max_chars).collect();
        format!("{truncated}...")
    }
}
