//! Top-level round orchestration.
//!
//! `WorldEngine` wires the collaborators together: dispatcher for the agent
//! batch, aggregator for the views, director for the environment, committer
//! for persistence, and the consistency gate for question rounds. It owns no
//! world state itself beyond the per-world rosters; everything durable lives
//! behind `SnapshotStore` and `RoundJournal`.

use crate::agent::ActorDefinition;
use crate::aggregate::{HiddenView, SurfaceView, project_views};
use crate::commit::{CommitRecord, commit_round};
use crate::config::EngineConfig;
use crate::director::{Director, EnvironmentDecision, EnvironmentDelta, SceneClassifier};
use crate::dispatch::Dispatcher;
use crate::error::{EngineError, Result, RoundError};
use crate::gate::{ConsistencyJudge, GateVerdict, run_gate};
use crate::journal::{JournalEntry, RoundJournal};
use crate::provider::NarrativeProvider;
use crate::state::{ActorState, EnvironmentState, Snapshot};
use crate::store::SnapshotStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Everything a caller gets back from one instruction round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundOutput {
    pub step_id: u64,
    pub surface: SurfaceView,
    pub hidden: HiddenView,
    /// Exactly the actors whose tasks failed this round.
    pub rejected_actors: Vec<String>,
    pub commit: CommitRecord,
}

/// Result of a question round: the answer always comes back, the commit only
/// happens when the gate passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatedRoundOutput {
    pub answer: String,
    pub verdict: GateVerdict,
    pub committed: bool,
    pub step_id: Option<u64>,
}

pub struct WorldEngine {
    config: EngineConfig,
    store: Arc<dyn SnapshotStore>,
    journal: Arc<dyn RoundJournal>,
    dispatcher: Dispatcher,
    director: Director,
    provider: Arc<dyn NarrativeProvider>,
    judge: Arc<dyn ConsistencyJudge>,
    rosters: Mutex<HashMap<String, Vec<ActorDefinition>>>,
}

impl WorldEngine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn SnapshotStore>,
        journal: Arc<dyn RoundJournal>,
        provider: Arc<dyn NarrativeProvider>,
        classifier: Arc<dyn SceneClassifier>,
        judge: Arc<dyn ConsistencyJudge>,
    ) -> Result<Self> {
        config.validate().map_err(EngineError::Config)?;
        let dispatcher = Dispatcher::new(Arc::clone(&provider), &config);
        Ok(Self {
            config,
            store,
            journal,
            dispatcher,
            director: Director::new(classifier),
            provider,
            judge,
            rosters: Mutex::new(HashMap::new()),
        })
    }

    /// Bootstrap a world: genesis snapshot from the actor definitions plus
    /// the initial environment, roster registered for later rounds.
    pub fn create_world(
        &self,
        world: &str,
        roster: Vec<ActorDefinition>,
        environment: EnvironmentState,
    ) -> Result<()> {
        if roster.is_empty() {
            return Err(RoundError::EmptyRoster {
                world: world.to_string(),
            }
            .into());
        }

        let mut actors = BTreeMap::new();
        for definition in &roster {
            actors.insert(
                definition.id.clone(),
                ActorState {
                    attributes: definition.attributes.clone(),
                    ..ActorState::default()
                },
            );
        }

        self.store
            .create_world(world, Snapshot::genesis(actors, environment))?;
        self.lock_rosters().insert(world.to_string(), roster);
        info!(world, "world created");
        Ok(())
    }

    /// One full instruction round: dispatch, aggregate, evaluate, commit,
    /// journal. `actor_ids = None` runs the whole roster.
    pub async fn run_round(
        &self,
        world: &str,
        instruction: &str,
        actor_ids: Option<&[String]>,
    ) -> Result<RoundOutput> {
        let roster = self.world_roster(world)?;
        let selected = match actor_ids {
            None => roster.clone(),
            Some(ids) => {
                let mut subset = Vec::with_capacity(ids.len());
                for id in ids {
                    let actor = roster
                        .iter()
                        .find(|actor| &actor.id == id)
                        .ok_or_else(|| RoundError::UnknownActor {
                            world: world.to_string(),
                            actor_id: id.clone(),
                        })?;
                    subset.push(actor.clone());
                }
                subset
            }
        };
        if selected.is_empty() {
            return Err(RoundError::EmptyRoster {
                world: world.to_string(),
            }
            .into());
        }

        let base_step_id = self.store.get_current(world)?;
        let snapshot = Arc::new(self.store.load_snapshot(world, base_step_id)?);

        let outcomes = self
            .dispatcher
            .dispatch(Arc::clone(&snapshot), instruction, &selected)
            .await?;
        let (surface, hidden) = project_views(&outcomes, self.config.summary_snippet_len);
        let env_delta = self.director.evaluate(&snapshot, &surface, instruction).await;

        let commit = commit_round(
            self.store.as_ref(),
            world,
            base_step_id,
            &roster,
            &hidden,
            &env_delta,
        )?;

        self.journal.append(
            world,
            JournalEntry::new(commit.resulting_step_id, instruction, surface.summary.clone()),
        )?;

        Ok(RoundOutput {
            step_id: commit.resulting_step_id,
            rejected_actors: hidden.failed_actor_ids(),
            surface,
            hidden,
            commit,
        })
    }

    /// One question round. The provider answers against the current
    /// snapshot; the answer only becomes canon (a new snapshot plus journal
    /// entry) when the consistency gate passes.
    pub async fn run_gated_round(&self, world: &str, question: &str) -> Result<GatedRoundOutput> {
        let roster = self.world_roster(world)?;
        let base_step_id = self.store.get_current(world)?;
        let snapshot = self.store.load_snapshot(world, base_step_id)?;

        let answer = self.provider.answer(question, &snapshot).await?;
        let history = self.journal.recent(world, self.config.history_window)?;
        let verdict = run_gate(
            self.judge.as_ref(),
            question,
            &answer,
            &history,
            self.config.gate_threshold,
        )
        .await;

        if !verdict.passed {
            info!(world, score = verdict.score, "gate blocked, answer not canonized");
            return Ok(GatedRoundOutput {
                answer,
                verdict,
                committed: false,
                step_id: None,
            });
        }

        let scene_updates = verdict.scene_updates.clone().unwrap_or_default();
        let env_delta = EnvironmentDelta {
            decision: EnvironmentDecision::NoChange,
            surface_patch: scene_updates.surface,
            hidden_patch: scene_updates.hidden,
            new_events: Vec::new(),
            actor_attributes: BTreeMap::new(),
            elapsed_minutes: 0,
            degraded: false,
        };
        let commit = commit_round(
            self.store.as_ref(),
            world,
            base_step_id,
            &roster,
            &HiddenView::default(),
            &env_delta,
        )?;

        self.journal.append(
            world,
            JournalEntry::new(commit.resulting_step_id, question, answer.clone()),
        )?;

        Ok(GatedRoundOutput {
            answer,
            verdict,
            committed: true,
            step_id: Some(commit.resulting_step_id),
        })
    }

    /// Repoint the world's current pointer to an earlier step. Later
    /// snapshots stay readable until the next commit claims their step ids;
    /// history stays a single chain from the chosen step.
    pub fn rollback(&self, world: &str, step_id: u64) -> Result<()> {
        self.store.rollback(world, step_id)?;
        info!(world, step_id, "rolled back");
        Ok(())
    }

    pub fn current_snapshot(&self, world: &str) -> Result<Snapshot> {
        let step_id = self.store.get_current(world)?;
        Ok(self.store.load_snapshot(world, step_id)?)
    }

    fn world_roster(&self, world: &str) -> Result<Vec<ActorDefinition>> {
        let rosters = self.lock_rosters();
        match rosters.get(world) {
            Some(roster) if !roster.is_empty() => Ok(roster.clone()),
            _ => Err(RoundError::EmptyRoster {
                world: world.to_string(),
            }
            .into()),
        }
    }

    fn lock_rosters(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<ActorDefinition>>> {
        self.rosters
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
