use crate::error::StoreError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

// ─── Round journal ──────────────────────────────────────────────────────────

/// One instruction-to-commit cycle as remembered for later rounds. The
/// consistency gate reads a window of these back as its history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub step_id: u64,
    pub instruction: String,
    pub summary: String,
    pub created_at: String,
}

impl JournalEntry {
    pub fn new(step_id: u64, instruction: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            step_id,
            instruction: instruction.into(),
            summary: summary.into(),
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Append-only per-world log of rounds.
pub trait RoundJournal: Send + Sync {
    fn append(&self, world: &str, entry: JournalEntry) -> Result<(), StoreError>;

    /// The most recent `limit` entries, oldest first.
    fn recent(&self, world: &str, limit: usize) -> Result<Vec<JournalEntry>, StoreError>;
}

/// In-memory journal companion to `MemoryStore`.
pub struct MemoryJournal {
    entries: Mutex<HashMap<String, Vec<JournalEntry>>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryJournal {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundJournal for MemoryJournal {
    fn append(&self, world: &str, entry: JournalEntry) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.entry(world.to_string()).or_default().push(entry);
        Ok(())
    }

    fn recent(&self, world: &str, limit: usize) -> Result<Vec<JournalEntry>, StoreError> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let log = entries.get(world).map(Vec::as_slice).unwrap_or_default();
        let start = log.len().saturating_sub(limit);
        Ok(log[start..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_returns_window_oldest_first() {
        let journal = MemoryJournal::new();
        for step in 1..=5 {
            journal
                .append(
                    "frontier",
                    JournalEntry::new(step, format!("order {step}"), format!("summary {step}")),
                )
                .unwrap();
        }

        let window = journal.recent("frontier", 3).unwrap();
        assert_eq!(window.len(), 3);
        assert_eq!(window[0].step_id, 3);
        assert_eq!(window[2].step_id, 5);
    }

    #[test]
    fn recent_on_unknown_world_is_empty() {
        let journal = MemoryJournal::new();
        assert!(journal.recent("nowhere", 5).unwrap().is_empty());
    }

    #[test]
    fn limit_larger_than_log_returns_everything() {
        let journal = MemoryJournal::new();
        journal
            .append("frontier", JournalEntry::new(1, "scout ahead", "scouted"))
            .unwrap();
        let window = journal.recent("frontier", 10).unwrap();
        assert_eq!(window.len(), 1);
    }
}
