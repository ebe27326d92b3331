//! End-to-end round behavior against the in-memory store: fan-out and
//! failure isolation, view projection, environment evaluation, gated
//! commits, and snapshot history.

use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use worldloom::commit::GAME_TIME_KEY;
use worldloom::director::{EventDraft, SceneClassifier, SceneJudgement};
use worldloom::gate::GateReport;
use worldloom::journal::{MemoryJournal, RoundJournal};
use worldloom::provider::parse_reply;
use worldloom::state::EventRecord;
use worldloom::store::MemoryStore;
use worldloom::{
    ActorDefinition, ConsistencyJudge, EngineConfig, EngineError, EnvironmentDecision,
    EnvironmentState, JournalEntry, NarrativeProvider, NarrativeReply, NarrativeRequest,
    RoundError, Snapshot, SnapshotStore, WorldEngine,
};

// ─── Scripted collaborators ─────────────────────────────────────────────────

/// Replays canned raw replies per actor id; ids without a script fail.
struct ScriptedProvider {
    replies: HashMap<String, String>,
    answer: String,
}

impl ScriptedProvider {
    fn new(replies: &[(&str, &str)]) -> Self {
        Self {
            replies: replies
                .iter()
                .map(|(id, raw)| ((*id).to_string(), (*raw).to_string()))
                .collect(),
            answer: "The pass is quiet.".to_string(),
        }
    }
}

impl NarrativeProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn narrate<'a>(
        &'a self,
        request: NarrativeRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<NarrativeReply>> + Send + 'a>> {
        let actor_id = request.actor.id.clone();
        Box::pin(async move {
            match self.replies.get(&actor_id).map(String::as_str) {
                Some(HANG) => {
                    tokio::time::sleep(std::time::Duration::from_secs(86_400)).await;
                    unreachable!()
                }
                Some(raw) => Ok(parse_reply(raw)?),
                None => anyhow::bail!("no reply scripted for {actor_id}"),
            }
        })
    }

    fn answer<'a>(
        &'a self,
        _question: &'a str,
        _snapshot: &'a Snapshot,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
        Box::pin(async move { Ok(self.answer.clone()) })
    }
}

struct ScriptedClassifier(SceneJudgement);

impl ScriptedClassifier {
    fn idle() -> Self {
        Self(SceneJudgement {
            decision: EnvironmentDecision::NoChange,
            surface_patch: Map::new(),
            hidden_patch: Map::new(),
            new_events: Vec::new(),
            actor_attributes: BTreeMap::new(),
            elapsed_minutes: 0,
        })
    }
}

impl SceneClassifier for ScriptedClassifier {
    fn name(&self) -> &str {
        "scripted"
    }

    fn classify<'a>(
        &'a self,
        _snapshot: &'a Snapshot,
        _surface_view: &'a worldloom::SurfaceView,
        _instruction: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<SceneJudgement>> + Send + 'a>> {
        let judgement = self.0.clone();
        Box::pin(async move { Ok(judgement) })
    }
}

struct FixedJudge(f64);

impl ConsistencyJudge for FixedJudge {
    fn name(&self) -> &str {
        "fixed"
    }

    fn review<'a>(
        &'a self,
        _question: &'a str,
        _answer: &'a str,
        _history: &'a [JournalEntry],
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<GateReport>> + Send + 'a>> {
        let score = self.0;
        Box::pin(async move {
            Ok(GateReport {
                score,
                feedback: "scripted verdict".into(),
                scene_updates: None,
            })
        })
    }
}

// ─── Fixtures ───────────────────────────────────────────────────────────────

fn as_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

fn roster() -> Vec<ActorDefinition> {
    let mut mira = ActorDefinition::new("mira", "Mira");
    mira.attributes = as_map(json!({"hp": 100, "stamina": 120}));
    let mut torvald = ActorDefinition::new("torvald", "Torvald");
    torvald.attributes = as_map(json!({"hp": 100}));
    let mut edda = ActorDefinition::new("edda", "Edda");
    edda.attributes = as_map(json!({"hp": 100}));
    vec![mira, torvald, edda]
}

fn environment() -> EnvironmentState {
    let mut surface = Map::new();
    surface.insert("location".into(), json!("ashen pass"));
    surface.insert("connected_scenes".into(), json!(["ruined chapel", "fen road"]));
    EnvironmentState {
        surface,
        hidden: Map::new(),
        event_log: vec![
            EventRecord::new("event_triggered", "the caravan departs"),
            EventRecord::new("event_triggered", "first snow"),
            EventRecord::new("event_triggered", "wolves heard at dusk"),
        ],
    }
}

struct Harness {
    engine: WorldEngine,
    store: Arc<MemoryStore>,
    journal: Arc<MemoryJournal>,
}

fn harness_with(
    replies: &[(&str, &str)],
    classifier: ScriptedClassifier,
    judge_score: f64,
) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let journal = Arc::new(MemoryJournal::new());
    let engine = WorldEngine::new(
        EngineConfig::default(),
        Arc::clone(&store) as Arc<dyn SnapshotStore>,
        Arc::clone(&journal) as Arc<dyn RoundJournal>,
        Arc::new(ScriptedProvider::new(replies)),
        Arc::new(classifier),
        Arc::new(FixedJudge(judge_score)),
    )
    .unwrap();
    engine.create_world("frontier", roster(), environment()).unwrap();
    Harness {
        engine,
        store,
        journal,
    }
}

/// Sentinel reply that makes `ScriptedProvider` hang past any timeout.
const HANG: &str = "__hang__";

const MIRA_REPLY: &str = r#"{
    "narrative": "Mira takes the hit and staggers back into the shield wall.",
    "state_delta": {
        "surface": {"perceived_state": "bloodied but standing"},
        "hidden": {
            "observer_state": "deep gash along the left arm",
            "inner_monologue": "If Torvald does not answer soon, we fall back."
        }
    },
    "attribute_delta": {"hp": 90}
}"#;

const EDDA_REPLY: &str = r#"{
    "narrative": "Edda kneels and reads the tracks in the frost.",
    "attribute_delta": {"stamina": 110}
}"#;

// ─── Rounds ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_actor_is_isolated_and_copied_forward() {
    let harness = harness_with(
        &[("mira", MIRA_REPLY), ("edda", EDDA_REPLY)],
        ScriptedClassifier::idle(),
        1.0,
    );

    let output = harness
        .engine
        .run_round("frontier", "hold the pass", None)
        .await
        .unwrap();

    assert_eq!(output.step_id, 1);
    assert_eq!(output.surface.entries.len(), 2);
    assert_eq!(output.rejected_actors, vec!["torvald".to_string()]);
    assert_eq!(output.hidden.failures[0].kind, "upstream");

    let child = harness.engine.current_snapshot("frontier").unwrap();
    assert_eq!(child.actors["mira"].attributes["hp"], json!(90));
    assert_eq!(child.actors["mira"].attributes["stamina"], json!(120));
    assert_eq!(child.actors["edda"].attributes["stamina"], json!(110));
    // Torvald failed: identical to the parent entry.
    let parent = harness.store.load_snapshot("frontier", 0).unwrap();
    assert_eq!(child.actors["torvald"], parent.actors["torvald"]);
}

#[tokio::test(start_paused = true)]
async fn timed_out_actor_is_rejected_and_unchanged() {
    let harness = harness_with(
        &[("mira", MIRA_REPLY), ("torvald", HANG)],
        ScriptedClassifier::idle(),
        1.0,
    );

    let output = harness
        .engine
        .run_round(
            "frontier",
            "hold the pass",
            Some(&["mira".to_string(), "torvald".to_string()]),
        )
        .await
        .unwrap();

    assert_eq!(output.step_id, 1);
    assert_eq!(output.rejected_actors, vec!["torvald".to_string()]);
    assert_eq!(output.hidden.failures[0].kind, "timeout");

    let child = harness.engine.current_snapshot("frontier").unwrap();
    let parent = harness.store.load_snapshot("frontier", 0).unwrap();
    assert_eq!(child.actors["mira"].attributes["hp"], json!(90));
    assert_eq!(child.actors["torvald"], parent.actors["torvald"]);
}

#[tokio::test]
async fn all_failing_round_leaves_the_world_untouched() {
    let harness = harness_with(&[], ScriptedClassifier::idle(), 1.0);

    let result = harness.engine.run_round("frontier", "advance", None).await;
    assert!(matches!(
        result,
        Err(EngineError::Round(RoundError::AggregationFailure { count: 3 }))
    ));
    assert_eq!(harness.store.get_current("frontier").unwrap(), 0);
    assert!(harness.journal.recent("frontier", 10).unwrap().is_empty());
}

#[tokio::test]
async fn hidden_fields_never_reach_the_surface_view() {
    let harness = harness_with(
        &[("mira", MIRA_REPLY), ("edda", EDDA_REPLY)],
        ScriptedClassifier::idle(),
        1.0,
    );

    let output = harness
        .engine
        .run_round("frontier", "hold the pass", None)
        .await
        .unwrap();

    let surface_text = format!("{}\n{:?}", output.surface.summary, output.surface.entries);
    assert!(!surface_text.contains("deep gash"));
    assert!(!surface_text.contains("we fall back"));

    // The hidden view and the snapshot carry them.
    assert_eq!(
        output.hidden.state_deltas["mira"]
            .hidden
            .observer_state
            .as_deref(),
        Some("deep gash along the left arm")
    );
    let child = harness.engine.current_snapshot("frontier").unwrap();
    assert_eq!(
        child.actors["mira"].hidden.inner_monologue,
        "If Torvald does not answer soon, we fall back."
    );
    assert_eq!(
        child.actors["mira"].surface.perceived_state,
        "bloodied but standing"
    );
}

#[tokio::test]
async fn identical_rounds_yield_identical_state() {
    let replies = [("mira", MIRA_REPLY), ("edda", EDDA_REPLY)];
    let first = harness_with(&replies, ScriptedClassifier::idle(), 1.0);
    let second = harness_with(&replies, ScriptedClassifier::idle(), 1.0);

    let a = first
        .engine
        .run_round("frontier", "hold the pass", None)
        .await
        .unwrap();
    let b = second
        .engine
        .run_round("frontier", "hold the pass", None)
        .await
        .unwrap();

    assert_eq!(a.surface, b.surface);
    assert_eq!(a.hidden, b.hidden);

    let snap_a = first.engine.current_snapshot("frontier").unwrap();
    let snap_b = second.engine.current_snapshot("frontier").unwrap();
    assert_eq!(snap_a.actors, snap_b.actors);
    assert_eq!(snap_a.environment.surface, snap_b.environment.surface);
}

#[tokio::test]
async fn rollback_then_reapply_reproduces_the_child() {
    let harness = harness_with(
        &[("mira", MIRA_REPLY), ("edda", EDDA_REPLY)],
        ScriptedClassifier::idle(),
        1.0,
    );

    harness
        .engine
        .run_round("frontier", "hold the pass", None)
        .await
        .unwrap();
    let original = harness.engine.current_snapshot("frontier").unwrap();

    harness.engine.rollback("frontier", 0).unwrap();
    assert_eq!(harness.store.get_current("frontier").unwrap(), 0);

    harness
        .engine
        .run_round("frontier", "hold the pass", None)
        .await
        .unwrap();
    let replayed = harness.engine.current_snapshot("frontier").unwrap();

    assert!(replayed.same_state_as(&original));
}

// ─── Environment evaluation ─────────────────────────────────────────────────

#[tokio::test]
async fn scene_transition_appends_without_rewriting_the_log() {
    let classifier = ScriptedClassifier(SceneJudgement {
        decision: EnvironmentDecision::SceneTransition {
            target: "ruined chapel".into(),
        },
        surface_patch: Map::new(),
        hidden_patch: Map::new(),
        new_events: vec![EventDraft {
            kind: String::new(),
            description: "Bells toll beyond the ridge.".into(),
        }],
        actor_attributes: BTreeMap::new(),
        elapsed_minutes: 30,
    });
    let harness = harness_with(&[("mira", MIRA_REPLY), ("edda", EDDA_REPLY)], classifier, 1.0);
    let parent_log = harness
        .store
        .load_snapshot("frontier", 0)
        .unwrap()
        .environment
        .event_log;
    assert_eq!(parent_log.len(), 3);

    let output = harness
        .engine
        .run_round("frontier", "push through", None)
        .await
        .unwrap();
    assert_eq!(
        output.commit.decision,
        EnvironmentDecision::SceneTransition {
            target: "ruined chapel".into()
        }
    );

    let child = harness.engine.current_snapshot("frontier").unwrap();
    assert_eq!(child.environment.surface["location"], json!("ruined chapel"));
    assert_eq!(child.environment.surface[GAME_TIME_KEY], json!(30));
    assert_eq!(child.environment.event_log.len(), 5);
    assert_eq!(child.environment.event_log[..3], parent_log[..]);
    assert_eq!(child.environment.event_log[4].kind, "scene_transition");
}

#[tokio::test]
async fn unconnected_transition_degrades_but_the_round_commits() {
    let classifier = ScriptedClassifier(SceneJudgement {
        decision: EnvironmentDecision::SceneTransition {
            target: "obsidian keep".into(),
        },
        surface_patch: Map::new(),
        hidden_patch: Map::new(),
        new_events: Vec::new(),
        actor_attributes: BTreeMap::new(),
        elapsed_minutes: 30,
    });
    let harness = harness_with(&[("mira", MIRA_REPLY), ("edda", EDDA_REPLY)], classifier, 1.0);

    let output = harness
        .engine
        .run_round("frontier", "push through", None)
        .await
        .unwrap();

    assert_eq!(output.commit.decision, EnvironmentDecision::NoChange);
    assert!(output.commit.degraded);
    let child = harness.engine.current_snapshot("frontier").unwrap();
    assert_eq!(child.environment.surface["location"], json!("ashen pass"));
    assert_eq!(child.actors["mira"].attributes["hp"], json!(90));
}

// ─── Gated rounds ───────────────────────────────────────────────────────────

#[tokio::test]
async fn gate_below_threshold_blocks_the_commit() {
    let harness = harness_with(&[], ScriptedClassifier::idle(), 0.65);

    let output = harness
        .engine
        .run_gated_round("frontier", "is the bridge out?")
        .await
        .unwrap();

    assert_eq!(output.answer, "The pass is quiet.");
    assert!(!output.committed);
    assert_eq!(output.step_id, None);
    assert!(!output.verdict.passed);
    assert_eq!(harness.store.get_current("frontier").unwrap(), 0);
    assert!(harness.journal.recent("frontier", 10).unwrap().is_empty());
}

#[tokio::test]
async fn gate_above_threshold_commits_one_step() {
    let harness = harness_with(&[], ScriptedClassifier::idle(), 0.95);

    let output = harness
        .engine
        .run_gated_round("frontier", "is the bridge out?")
        .await
        .unwrap();

    assert!(output.committed);
    assert_eq!(output.step_id, Some(1));
    assert_eq!(harness.store.get_current("frontier").unwrap(), 1);

    let entries = harness.journal.recent("frontier", 10).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].instruction, "is the bridge out?");
    assert_eq!(entries[0].summary, "The pass is quiet.");

    // State is untouched, only the chain advanced.
    let child = harness.engine.current_snapshot("frontier").unwrap();
    let parent = harness.store.load_snapshot("frontier", 0).unwrap();
    assert_eq!(child.actors, parent.actors);
    assert_eq!(child.parent_step_id, Some(0));
}

// ─── Roster subsets ─────────────────────────────────────────────────────────

#[tokio::test]
async fn subset_round_touches_only_the_selected_actor() {
    let harness = harness_with(
        &[("mira", MIRA_REPLY), ("edda", EDDA_REPLY)],
        ScriptedClassifier::idle(),
        1.0,
    );

    let output = harness
        .engine
        .run_round("frontier", "scout ahead", Some(&["edda".to_string()]))
        .await
        .unwrap();

    assert_eq!(output.surface.entries.len(), 1);
    assert_eq!(output.surface.entries[0].actor_id, "edda");
    assert_eq!(output.commit.accepted, vec!["edda".to_string()]);

    let child = harness.engine.current_snapshot("frontier").unwrap();
    let parent = harness.store.load_snapshot("frontier", 0).unwrap();
    assert_eq!(child.actors["edda"].attributes["stamina"], json!(110));
    assert_eq!(child.actors["mira"], parent.actors["mira"]);
    assert_eq!(child.actors["torvald"], parent.actors["torvald"]);
}

#[tokio::test]
async fn journal_records_each_committed_round() {
    let harness = harness_with(
        &[("mira", MIRA_REPLY), ("edda", EDDA_REPLY)],
        ScriptedClassifier::idle(),
        1.0,
    );

    harness
        .engine
        .run_round("frontier", "hold the pass", None)
        .await
        .unwrap();
    harness
        .engine
        .run_round("frontier", "regroup", None)
        .await
        .unwrap();

    let entries = harness.journal.recent("frontier", 10).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].step_id, 1);
    assert_eq!(entries[0].instruction, "hold the pass");
    assert_eq!(entries[1].step_id, 2);
    assert!(entries[0].summary.contains("Mira:"));
}
