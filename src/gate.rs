//! Consistency gate for question-driven rounds.
//!
//! An informational answer only becomes canon when a judge scores it against
//! the recent round history. The judge is another external capability; a
//! judge failure yields the neutral score 0.5 rather than blocking the round,
//! so gating behavior then rests entirely on the configured threshold.

use crate::journal::JournalEntry;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};

/// Score the judge hands back when it cannot produce a verdict.
pub const NEUTRAL_SCORE: f64 = 0.5;

// ─── Judge capability ───────────────────────────────────────────────────────

/// Environment patches the judge may attach when the answer establishes new
/// world facts that should land with the commit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneUpdates {
    #[serde(default)]
    pub surface: Map<String, Value>,
    #[serde(default)]
    pub hidden: Map<String, Value>,
}

/// Raw judge output before clamping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateReport {
    pub score: f64,
    #[serde(default)]
    pub feedback: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_updates: Option<SceneUpdates>,
}

pub trait ConsistencyJudge: Send + Sync {
    fn name(&self) -> &str;

    /// Score how consistent `answer` is with the recent history, 0.0 to 1.0.
    fn review<'a>(
        &'a self,
        question: &'a str,
        answer: &'a str,
        history: &'a [JournalEntry],
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<GateReport>> + Send + 'a>>;
}

// ─── Gate ───────────────────────────────────────────────────────────────────

/// Final gate decision for one question round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateVerdict {
    /// Clamped to 0.0..=1.0.
    pub score: f64,
    pub passed: bool,
    pub feedback: String,
    pub scene_updates: Option<SceneUpdates>,
}

pub async fn run_gate(
    judge: &dyn ConsistencyJudge,
    question: &str,
    answer: &str,
    history: &[JournalEntry],
    threshold: f64,
) -> GateVerdict {
    let report = match judge.review(question, answer, history).await {
        Ok(report) => report,
        Err(error) => {
            warn!(judge = judge.name(), %error, "consistency judge failed, scoring neutral");
            GateReport {
                score: NEUTRAL_SCORE,
                feedback: format!("judge unavailable: {error}"),
                scene_updates: None,
            }
        }
    };

    let score = report.score.clamp(0.0, 1.0);
    let passed = score >= threshold;
    debug!(score, threshold, passed, "gate verdict");

    GateVerdict {
        score,
        passed,
        feedback: report.feedback,
        scene_updates: report.scene_updates,
    }
}
