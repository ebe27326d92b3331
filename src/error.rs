use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `worldloom`.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; internal code continues to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum EngineError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Agent task ──────────────────────────────────────────────────────
    #[error("agent: {0}")]
    Agent(#[from] AgentError),

    // ── Round orchestration ─────────────────────────────────────────────
    #[error("round: {0}")]
    Round(#[from] RoundError),

    // ── Snapshot store ──────────────────────────────────────────────────
    #[error("store: {0}")]
    Store(#[from] StoreError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Agent task errors ──────────────────────────────────────────────────────

/// Per-actor failure. Recovered locally by the dispatcher: a failing actor
/// yields a failed `AgentOutcome` and is reported in the hidden view only.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentError {
    #[error("agent task timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("malformed narrative reply: {message}")]
    MalformedReply { message: String },

    #[error("upstream generation failed: {message}")]
    Upstream { message: String },
}

impl AgentError {
    /// Short stable label for the hidden view and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::MalformedReply { .. } => "malformed_reply",
            Self::Upstream { .. } => "upstream",
        }
    }
}

// ─── Round errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RoundError {
    /// Every dispatched actor failed; the batch produces no commit.
    #[error("all {count} agent tasks failed, round aborted")]
    AggregationFailure { count: usize },

    #[error("world {world} has no registered actors")]
    EmptyRoster { world: String },

    #[error("actor {actor_id} is not in the roster of world {world}")]
    UnknownActor { world: String, actor_id: String },
}

// ─── Snapshot store errors ──────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot {step_id} not found in world {world}")]
    SnapshotNotFound { world: String, step_id: u64 },

    /// Another round advanced the current pointer first. Retryable: the
    /// caller should re-fetch the current step id and run the round again.
    #[error("commit conflict in world {world}: base {base} but current is {current}")]
    CommitConflict { world: String, base: u64, current: u64 },

    #[error("world not found: {0}")]
    WorldNotFound(String),

    #[error("backend: {0}")]
    Backend(String),

    #[error("codec: {0}")]
    Codec(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Backend(error.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::Codec(error.to_string())
    }
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
