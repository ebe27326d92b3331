use crate::agent::{ActorDefinition, AgentOutcome, run_agent_task};
use crate::config::EngineConfig;
use crate::error::{AgentError, RoundError};
use crate::provider::NarrativeProvider;
use crate::state::Snapshot;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Fans one batch of agent tasks out and joins on all of them.
///
/// One spawned task per requested actor, a semaphore bounding parallelism,
/// and a barrier join that returns outcomes in roster order: exactly one per
/// requested actor, success or failure, regardless of arrival order. No
/// streaming of partial results.
pub struct Dispatcher {
    provider: Arc<dyn NarrativeProvider>,
    max_parallelism: usize,
    task_timeout: Duration,
}

impl Dispatcher {
    pub fn new(provider: Arc<dyn NarrativeProvider>, config: &EngineConfig) -> Self {
        Self {
            provider,
            max_parallelism: config.max_parallelism,
            task_timeout: Duration::from_secs(config.agent_timeout_secs),
        }
    }

    /// Run the batch. Individual failures degrade to failed outcomes; only
    /// a fully failed batch aborts the round with `AggregationFailure`.
    pub async fn dispatch(
        &self,
        snapshot: Arc<Snapshot>,
        instruction: &str,
        actors: &[ActorDefinition],
    ) -> Result<Vec<AgentOutcome>, RoundError> {
        info!(
            actors = actors.len(),
            max_parallelism = self.max_parallelism,
            "dispatching agent batch"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_parallelism));
        let instruction: Arc<str> = Arc::from(instruction);

        // JoinSet so that dropping the dispatch future aborts every
        // outstanding task; nothing is written before the join anyway.
        let mut tasks = JoinSet::new();
        for (index, actor) in actors.iter().enumerate() {
            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&semaphore);
            let snapshot = Arc::clone(&snapshot);
            let instruction = Arc::clone(&instruction);
            let actor = actor.clone();
            let timeout = self.task_timeout;

            tasks.spawn(async move {
                // A closed semaphore cannot happen while the dispatcher is
                // alive; treat it as an upstream failure rather than panic.
                let outcome = match semaphore.acquire().await {
                    Ok(_permit) => {
                        run_agent_task(provider.as_ref(), &actor, &snapshot, &instruction, timeout)
                            .await
                    }
                    Err(error) => AgentOutcome::failed(
                        &actor,
                        AgentError::Upstream {
                            message: error.to_string(),
                        },
                    ),
                };
                (index, outcome)
            });
        }

        // Barrier join: arrival order is irrelevant, slots restore roster
        // order afterwards.
        let mut slots: Vec<Option<AgentOutcome>> = actors.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            if let Ok((index, outcome)) = joined {
                debug!(actor_id = %outcome.actor_id, ok = outcome.is_ok(), "agent outcome collected");
                slots[index] = Some(outcome);
            }
        }

        // A slot only stays empty if its task panicked or was aborted.
        let mut outcomes = Vec::with_capacity(actors.len());
        for (actor, slot) in actors.iter().zip(slots) {
            outcomes.push(slot.unwrap_or_else(|| {
                AgentOutcome::failed(
                    actor,
                    AgentError::Upstream {
                        message: "agent task aborted before completion".into(),
                    },
                )
            }));
        }

        if !outcomes.is_empty() && outcomes.iter().all(|outcome| !outcome.is_ok()) {
            return Err(RoundError::AggregationFailure {
                count: outcomes.len(),
            });
        }
        Ok(outcomes)
    }
}
