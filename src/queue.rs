//! Offline mutation queue.
//!
//! Mutating requests that cannot reach the origin are captured here as
//! durable records and replayed later by the sync coordinator. Records are
//! kept forever as history; `synced` only ever flips `false -> true`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::db::QueueStore;

/// Kind of captured mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
  Score,
  TimerEvent,
}

impl MutationKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      MutationKind::Score => "score",
      MutationKind::TimerEvent => "timer_event",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "score" => Some(MutationKind::Score),
      "timer_event" => Some(MutationKind::TimerEvent),
      _ => None,
    }
  }

  /// Kind implied by a mutating request path, if any.
  ///
  /// Paths containing `submit` carry score submissions; `start`/`stop`
  /// carry timer control events. Anything else is not queueable.
  pub fn from_path(path: &str) -> Option<Self> {
    if path.contains("submit") {
      Some(MutationKind::Score)
    } else if path.contains("start") || path.contains("stop") {
      Some(MutationKind::TimerEvent)
    } else {
      None
    }
  }
}

/// A durably stored write operation awaiting delivery to the origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMutation {
  /// Unique id assigned by the store
  pub id: i64,
  pub kind: MutationKind,
  /// Opaque domain object (score payload, timer event)
  pub payload: serde_json::Value,
  pub created_at: DateTime<Utc>,
  pub synced: bool,
}

/// Unsynced records grouped per kind, as returned to the host application.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineData {
  pub scores: Vec<QueuedMutation>,
  pub timer_events: Vec<QueuedMutation>,
}

/// Queue facade over the persistent store.
#[derive(Clone)]
pub struct OfflineQueue {
  store: Arc<dyn QueueStore>,
}

impl OfflineQueue {
  pub fn new(store: Arc<dyn QueueStore>) -> Self {
    Self { store }
  }

  /// Capture a mutation. Store failures are logged and absorbed - an
  /// in-flight request interception must never fail because the queue
  /// could not be written.
  pub fn enqueue(&self, kind: MutationKind, payload: serde_json::Value) -> Option<i64> {
    match self.store.insert(kind, &payload, Utc::now()) {
      Ok(id) => Some(id),
      Err(e) => {
        warn!(kind = kind.as_str(), error = %e, "failed to enqueue offline mutation");
        None
      }
    }
  }

  pub fn list_unsynced(&self, kind: MutationKind) -> Result<Vec<QueuedMutation>> {
    self.store.list_unsynced(kind)
  }

  /// Mark a record delivered. Only the sync coordinator calls this.
  pub fn mark_synced(&self, id: i64) -> Result<()> {
    self.store.mark_synced(id)
  }

  /// All unsynced records, grouped per kind. Store failures yield an empty
  /// group rather than an error so the host reply channel always answers.
  pub fn snapshot(&self) -> OfflineData {
    OfflineData {
      scores: self.list_or_empty(MutationKind::Score),
      timer_events: self.list_or_empty(MutationKind::TimerEvent),
    }
  }

  fn list_or_empty(&self, kind: MutationKind) -> Vec<QueuedMutation> {
    match self.store.list_unsynced(kind) {
      Ok(records) => records,
      Err(e) => {
        warn!(kind = kind.as_str(), error = %e, "failed to read offline queue");
        Vec::new()
      }
    }
  }
}
