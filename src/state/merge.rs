//! Structural merge rules shared by the committer.
//!
//! A patch that omits a key leaves the parent's value unchanged; a patch that
//! includes a key overwrites it. Nested objects merge recursively, scalars
//! and arrays replace wholesale.

use super::{ActorState, StateDelta};
use serde_json::{Map, Value};

/// Merge `patch` into `base`, key by key.
pub fn merge_map(base: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, patch_value) in patch {
        match (base.get_mut(key), patch_value) {
            (Some(Value::Object(base_obj)), Value::Object(patch_obj)) => {
                merge_map(base_obj, patch_obj);
            }
            _ => {
                base.insert(key.clone(), patch_value.clone());
            }
        }
    }
}

/// Combine an agent's attribute delta with the director's contribution for
/// the same actor. Numbers on the same key accumulate; anything else the
/// director's value wins (last writer within the batch).
pub fn merge_attribute_deltas(
    agent: &Map<String, Value>,
    director: &Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = agent.clone();
    for (key, director_value) in director {
        let combined = match (merged.get(key), director_value) {
            (Some(Value::Number(a)), Value::Number(d)) => {
                match (a.as_f64(), d.as_f64()) {
                    (Some(a), Some(d)) => serde_json::Number::from_f64(a + d)
                        .map(Value::Number)
                        .unwrap_or_else(|| director_value.clone()),
                    _ => director_value.clone(),
                }
            }
            _ => director_value.clone(),
        };
        merged.insert(key.clone(), combined);
    }
    merged
}

/// Apply a delta plus an attribute patch onto a parent actor state, yielding
/// the child state. The parent is untouched.
pub fn apply_actor_delta(
    parent: &ActorState,
    delta: &StateDelta,
    attributes: &Map<String, Value>,
) -> ActorState {
    let mut child = parent.clone();

    if let Some(perceived) = &delta.surface.perceived_state {
        child.surface.perceived_state = perceived.clone();
    }
    if let Some(observer) = &delta.hidden.observer_state {
        child.hidden.observer_state = observer.clone();
    }
    if let Some(monologue) = &delta.hidden.inner_monologue {
        child.hidden.inner_monologue = monologue.clone();
    }
    merge_map(&mut child.attributes, attributes);

    child
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{HiddenPatch, SurfacePatch};
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn omitted_keys_keep_parent_values() {
        let mut base = as_map(json!({"hp": 100, "mp": 40}));
        let patch = as_map(json!({"hp": 90}));
        merge_map(&mut base, &patch);
        assert_eq!(base["hp"], json!(90));
        assert_eq!(base["mp"], json!(40));
    }

    #[test]
    fn nested_objects_merge_recursively() {
        let mut base = as_map(json!({"vitals": {"hp": 100, "stamina": 120}, "gold": 5}));
        let patch = as_map(json!({"vitals": {"hp": 90}}));
        merge_map(&mut base, &patch);
        assert_eq!(base["vitals"], json!({"hp": 90, "stamina": 120}));
        assert_eq!(base["gold"], json!(5));
    }

    #[test]
    fn arrays_replace_wholesale() {
        let mut base = as_map(json!({"inventory": ["sword", "rope"]}));
        let patch = as_map(json!({"inventory": ["sword"]}));
        merge_map(&mut base, &patch);
        assert_eq!(base["inventory"], json!(["sword"]));
    }

    #[test]
    fn scalar_over_object_replaces() {
        let mut base = as_map(json!({"location": {"region": "border"}}));
        let patch = as_map(json!({"location": "guild hall"}));
        merge_map(&mut base, &patch);
        assert_eq!(base["location"], json!("guild hall"));
    }

    #[test]
    fn numeric_attribute_deltas_accumulate() {
        let agent = as_map(json!({"hp": -10, "morale": "steady"}));
        let director = as_map(json!({"hp": -5, "morale": "shaken"}));
        let merged = merge_attribute_deltas(&agent, &director);
        assert_eq!(merged["hp"], json!(-15.0));
        assert_eq!(merged["morale"], json!("shaken"));
    }

    #[test]
    fn director_only_keys_pass_through() {
        let agent = Map::new();
        let director = as_map(json!({"combat_state": "engaged"}));
        let merged = merge_attribute_deltas(&agent, &director);
        assert_eq!(merged["combat_state"], json!("engaged"));
    }

    #[test]
    fn apply_actor_delta_leaves_parent_untouched() {
        let parent = ActorState {
            attributes: as_map(json!({"hp": 100})),
            ..ActorState::default()
        };
        let delta = StateDelta {
            surface: SurfacePatch {
                perceived_state: Some("limping".into()),
            },
            hidden: HiddenPatch {
                inner_monologue: Some("that was close".into()),
                observer_state: None,
            },
        };
        let child = apply_actor_delta(&parent, &delta, &as_map(json!({"hp": 90})));

        assert_eq!(child.surface.perceived_state, "limping");
        assert_eq!(child.hidden.inner_monologue, "that was close");
        assert_eq!(child.hidden.observer_state, "");
        assert_eq!(child.attributes["hp"], json!(90));

        assert_eq!(parent.surface.perceived_state, "");
        assert_eq!(parent.attributes["hp"], json!(100));
    }
}
