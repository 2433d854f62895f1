//! Persistent store behind the offline mutation queue.
//!
//! The engine only depends on the [`QueueStore`] trait: a keyed durable
//! store supporting insert, scan, and update-by-id. [`SqliteStore`] is the
//! durable implementation; [`MemoryStore`] backs tests and hosts that opt
//! out of persistence.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};

use crate::queue::{MutationKind, QueuedMutation};

/// Trait for queue storage backends.
pub trait QueueStore: Send + Sync {
  /// Insert a new unsynced record and return its assigned id.
  fn insert(
    &self,
    kind: MutationKind,
    payload: &serde_json::Value,
    created_at: DateTime<Utc>,
  ) -> Result<i64>;

  /// All unsynced records of a kind, oldest first.
  fn list_unsynced(&self, kind: MutationKind) -> Result<Vec<QueuedMutation>>;

  /// Flip a record's synced flag to true. The flag is never reversed and
  /// records are never deleted - they are retained as history.
  fn mark_synced(&self, id: i64) -> Result<()>;
}

/// Schema for the mutation queue.
const QUEUE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS queued_mutations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    payload BLOB NOT NULL,
    created_at TEXT NOT NULL,
    synced INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_queued_mutations_unsynced
    ON queued_mutations(kind, synced);
"#;

/// SQLite-backed queue store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open or create the store at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create queue directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open queue database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open an in-memory store (non-durable).
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory queue database: {}", e))?;

    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Get the default database path.
  fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("meetsync").join("queue.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(QUEUE_SCHEMA)
      .map_err(|e| eyre!("Failed to run queue migrations: {}", e))?;

    Ok(())
  }
}

impl QueueStore for SqliteStore {
  fn insert(
    &self,
    kind: MutationKind,
    payload: &serde_json::Value,
    created_at: DateTime<Utc>,
  ) -> Result<i64> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let data =
      serde_json::to_vec(payload).map_err(|e| eyre!("Failed to serialize payload: {}", e))?;

    conn
      .execute(
        "INSERT INTO queued_mutations (kind, payload, created_at, synced) VALUES (?, ?, ?, 0)",
        params![kind.as_str(), data, created_at.to_rfc3339()],
      )
      .map_err(|e| eyre!("Failed to insert queued mutation: {}", e))?;

    Ok(conn.last_insert_rowid())
  }

  fn list_unsynced(&self, kind: MutationKind) -> Result<Vec<QueuedMutation>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT id, payload, created_at FROM queued_mutations
         WHERE kind = ? AND synced = 0
         ORDER BY id",
      )
      .map_err(|e| eyre!("Failed to prepare queue query: {}", e))?;

    let records = stmt
      .query_map(params![kind.as_str()], |row| {
        let id: i64 = row.get(0)?;
        let data: Vec<u8> = row.get(1)?;
        let created_at: String = row.get(2)?;
        Ok((id, data, created_at))
      })
      .map_err(|e| eyre!("Failed to query queued mutations: {}", e))?
      .filter_map(|r| r.ok())
      .filter_map(|(id, data, created_at)| {
        let payload = serde_json::from_slice(&data).ok()?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
          .ok()?
          .with_timezone(&Utc);
        Some(QueuedMutation {
          id,
          kind,
          payload,
          created_at,
          synced: false,
        })
      })
      .collect();

    Ok(records)
  }

  fn mark_synced(&self, id: i64) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let updated = conn
      .execute(
        "UPDATE queued_mutations SET synced = 1 WHERE id = ?",
        params![id],
      )
      .map_err(|e| eyre!("Failed to mark mutation synced: {}", e))?;

    if updated == 0 {
      return Err(eyre!("No queued mutation with id {}", id));
    }

    Ok(())
  }
}

/// In-memory queue store. Not durable - used by tests and hosts that
/// explicitly opt out of persistence.
pub struct MemoryStore {
  records: Mutex<Vec<QueuedMutation>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self {
      records: Mutex::new(Vec::new()),
    }
  }
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::new()
  }
}

impl QueueStore for MemoryStore {
  fn insert(
    &self,
    kind: MutationKind,
    payload: &serde_json::Value,
    created_at: DateTime<Utc>,
  ) -> Result<i64> {
    let mut records = self
      .records
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let id = records.last().map(|r| r.id + 1).unwrap_or(1);
    records.push(QueuedMutation {
      id,
      kind,
      payload: payload.clone(),
      created_at,
      synced: false,
    });

    Ok(id)
  }

  fn list_unsynced(&self, kind: MutationKind) -> Result<Vec<QueuedMutation>> {
    let records = self
      .records
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(
      records
        .iter()
        .filter(|r| r.kind == kind && !r.synced)
        .cloned()
        .collect(),
    )
  }

  fn mark_synced(&self, id: i64) -> Result<()> {
    let mut records = self
      .records
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let record = records
      .iter_mut()
      .find(|r| r.id == id)
      .ok_or_else(|| eyre!("No queued mutation with id {}", id))?;
    record.synced = true;

    Ok(())
  }
}
