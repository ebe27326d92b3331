use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ── Engine config ────────────────────────────────────────────────

/// Tunables for round orchestration. Loaded from TOML or built with
/// `EngineConfig::default()`; every field has a serde default so partial
/// files stay valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on concurrently running agent tasks.
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,

    /// Per-agent-task deadline. A task over deadline degrades to a failed
    /// outcome; it never stalls the rest of the batch.
    #[serde(default = "default_agent_timeout_secs")]
    pub agent_timeout_secs: u64,

    /// Minimum consistency score for a gated round to commit.
    #[serde(default = "default_gate_threshold")]
    pub gate_threshold: f64,

    /// How many journal entries the consistency gate reads back.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Per-actor narrative length in the combined surface summary.
    #[serde(default = "default_summary_snippet_len")]
    pub summary_snippet_len: usize,

    /// Path of the sqlite snapshot database, when the sqlite store is used.
    #[serde(default = "default_store_path")]
    pub store_path: String,
}

fn default_max_parallelism() -> usize {
    4
}

fn default_agent_timeout_secs() -> u64 {
    60
}

fn default_gate_threshold() -> f64 {
    0.7
}

fn default_history_window() -> usize {
    5
}

fn default_summary_snippet_len() -> usize {
    80
}

fn default_store_path() -> String {
    "worldloom.db".into()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallelism: default_max_parallelism(),
            agent_timeout_secs: default_agent_timeout_secs(),
            gate_threshold: default_gate_threshold(),
            history_window: default_history_window(),
            summary_snippet_len: default_summary_snippet_len(),
            store_path: default_store_path(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&raw).map_err(|error| ConfigError::Load(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parallelism == 0 {
            return Err(ConfigError::Validation(
                "max_parallelism must be at least 1".into(),
            ));
        }
        if self.agent_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "agent_timeout_secs must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.gate_threshold) {
            return Err(ConfigError::Validation(format!(
                "gate_threshold must be within 0.0..=1.0, got {}",
                self.gate_threshold
            )));
        }
        Ok(())
    }
}
