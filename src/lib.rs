#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

//! Parallel multi-agent world engine.
//!
//! One round fans an instruction out to every requested actor as an isolated
//! agent task, aggregates the outcomes into a player-visible surface view and
//! an operator-only hidden view, lets the director react with an environment
//! delta, and commits the result as a new immutable snapshot in a linear,
//! rollback-friendly history. Question rounds additionally pass through a
//! consistency gate before anything is committed.

pub mod agent;
pub mod aggregate;
pub mod commit;
pub mod config;
pub mod director;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod gate;
pub mod journal;
pub mod provider;
pub mod state;
pub mod store;

pub use agent::{ActorDefinition, AgentOutcome, OutcomeStatus};
pub use aggregate::{HiddenView, SurfaceView};
pub use config::EngineConfig;
pub use director::{EnvironmentDecision, SceneClassifier, SceneJudgement};
pub use engine::{GatedRoundOutput, RoundOutput, WorldEngine};
pub use error::{AgentError, EngineError, Result, RoundError, StoreError};
pub use gate::{ConsistencyJudge, GateReport, GateVerdict};
pub use journal::{JournalEntry, RoundJournal};
pub use provider::{NarrativeProvider, NarrativeReply, NarrativeRequest};
pub use state::{ActorState, EnvironmentState, EventRecord, Snapshot, StateDelta};
pub use store::{MemoryStore, SnapshotStore, SqliteStore};
