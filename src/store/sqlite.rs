use super::SnapshotStore;
use crate::error::StoreError;
use crate::journal::{JournalEntry, RoundJournal};
use crate::state::Snapshot;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;

/// Durable snapshot store and round journal on sqlite. Snapshots are stored
/// as JSON rows keyed by (world, step_id); the per-world current pointer
/// lives in its own table and moves inside a transaction, so readers never
/// observe a partially-written snapshot as current.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(db_path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        Self::initialize(conn)
    }

    /// Private in-memory database, handy for tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn)
    }

    fn initialize(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE IF NOT EXISTS worlds (
                 name TEXT PRIMARY KEY,
                 current_step INTEGER NOT NULL
             );

             CREATE TABLE IF NOT EXISTS snapshots (
                 world TEXT NOT NULL REFERENCES worlds(name) ON DELETE CASCADE,
                 step_id INTEGER NOT NULL,
                 parent_step_id INTEGER,
                 data TEXT NOT NULL,
                 created_at TEXT NOT NULL,
                 PRIMARY KEY (world, step_id)
             );

             CREATE TABLE IF NOT EXISTS journal (
                 world TEXT NOT NULL REFERENCES worlds(name) ON DELETE CASCADE,
                 step_id INTEGER NOT NULL,
                 instruction TEXT NOT NULL,
                 summary TEXT NOT NULL,
                 created_at TEXT NOT NULL
             );

             CREATE INDEX IF NOT EXISTS idx_journal_world
                 ON journal(world, created_at);",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock_connection(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|error| StoreError::Backend(format!("lock error: {error}")))
    }

    fn world_current(conn: &Connection, world: &str) -> Result<u64, StoreError> {
        let current: Option<i64> = conn
            .query_row(
                "SELECT current_step FROM worlds WHERE name = ?1",
                params![world],
                |row| row.get(0),
            )
            .optional()?;
        match current {
            Some(step) => u64::try_from(step)
                .map_err(|error| StoreError::Backend(format!("negative step id: {error}"))),
            None => Err(StoreError::WorldNotFound(world.to_string())),
        }
    }
}

impl SnapshotStore for SqliteStore {
    fn create_world(&self, world: &str, genesis: Snapshot) -> Result<(), StoreError> {
        let mut conn = self.lock_connection()?;
        let tx = conn.transaction().map_err(StoreError::from)?;

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO worlds (name, current_step) VALUES (?1, ?2)",
            params![world, i64::try_from(genesis.step_id).unwrap_or(0)],
        )?;
        if inserted == 0 {
            return Err(StoreError::Backend(format!(
                "world already exists: {world}"
            )));
        }

        let data = serde_json::to_string(&genesis)?;
        tx.execute(
            "INSERT INTO snapshots (world, step_id, parent_step_id, data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                world,
                i64::try_from(genesis.step_id).unwrap_or(0),
                genesis.parent_step_id.map(|id| id as i64),
                data,
                genesis.created_at
            ],
        )?;

        tx.commit().map_err(StoreError::from)
    }

    fn load_snapshot(&self, world: &str, step_id: u64) -> Result<Snapshot, StoreError> {
        let conn = self.lock_connection()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM snapshots WHERE world = ?1 AND step_id = ?2",
                params![world, step_id as i64],
                |row| row.get(0),
            )
            .optional()?;

        match data {
            Some(raw) => serde_json::from_str(&raw).map_err(StoreError::from),
            None => Err(StoreError::SnapshotNotFound {
                world: world.to_string(),
                step_id,
            }),
        }
    }

    fn write_snapshot(&self, world: &str, snapshot: &Snapshot) -> Result<u64, StoreError> {
        let conn = self.lock_connection()?;
        let current = Self::world_current(&conn, world)?;
        if snapshot.step_id <= current {
            return Err(StoreError::Backend(format!(
                "snapshot {} is committed history in world {world}",
                snapshot.step_id
            )));
        }

        // Beyond the current pointer only stale branches can exist, so a
        // replace is safe.
        let data = serde_json::to_string(snapshot)?;
        conn.execute(
            "INSERT OR REPLACE INTO snapshots (world, step_id, parent_step_id, data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                world,
                snapshot.step_id as i64,
                snapshot.parent_step_id.map(|id| id as i64),
                data,
                snapshot.created_at
            ],
        )?;
        Ok(snapshot.step_id)
    }

    fn get_current(&self, world: &str) -> Result<u64, StoreError> {
        let conn = self.lock_connection()?;
        Self::world_current(&conn, world)
    }

    fn set_current(&self, world: &str, step_id: u64) -> Result<(), StoreError> {
        let conn = self.lock_connection()?;

        let exists: Option<i64> = conn
            .query_row(
                "SELECT step_id FROM snapshots WHERE world = ?1 AND step_id = ?2",
                params![world, step_id as i64],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::SnapshotNotFound {
                world: world.to_string(),
                step_id,
            });
        }

        let updated = conn.execute(
            "UPDATE worlds SET current_step = ?1 WHERE name = ?2",
            params![step_id as i64, world],
        )?;
        if updated == 0 {
            return Err(StoreError::WorldNotFound(world.to_string()));
        }
        Ok(())
    }
}

impl RoundJournal for SqliteStore {
    fn append(&self, world: &str, entry: JournalEntry) -> Result<(), StoreError> {
        let conn = self.lock_connection()?;
        conn.execute(
            "INSERT INTO journal (world, step_id, instruction, summary, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                world,
                entry.step_id as i64,
                entry.instruction,
                entry.summary,
                entry.created_at
            ],
        )?;
        Ok(())
    }

    fn recent(&self, world: &str, limit: usize) -> Result<Vec<JournalEntry>, StoreError> {
        let conn = self.lock_connection()?;
        let limit_i64 = i64::try_from(limit)
            .map_err(|error| StoreError::Backend(format!("bad limit: {error}")))?;

        let mut stmt = conn.prepare(
            "SELECT step_id, instruction, summary, created_at
             FROM journal
             WHERE world = ?1
             ORDER BY created_at DESC, step_id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![world, limit_i64], |row| {
            Ok(JournalEntry {
                step_id: row.get::<_, i64>(0)? as u64,
                instruction: row.get(1)?,
                summary: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        entries.reverse();
        Ok(entries)
    }
}
