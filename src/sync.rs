//! Replay of queued mutations against the origin.
//!
//! Delivery is at-least-once: a record is only marked synced after the
//! origin accepts it, and a failed mark leaves it queued for the next
//! trigger. The origin is responsible for deduplicating resubmissions.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use color_eyre::{eyre::eyre, Result};
use tracing::{debug, warn};
use url::Url;

use crate::config::SyncEndpoints;
use crate::http::Request;
use crate::origin::Origin;
use crate::queue::{MutationKind, OfflineQueue};

/// Identifier correlating a deferred trigger with a mutation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncTag {
  ScoreSubmission,
  TimerEvents,
}

impl SyncTag {
  pub fn as_str(&self) -> &'static str {
    match self {
      SyncTag::ScoreSubmission => "score-submission",
      SyncTag::TimerEvents => "timer-events",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "score-submission" => Some(SyncTag::ScoreSubmission),
      "timer-events" => Some(SyncTag::TimerEvents),
      _ => None,
    }
  }

  pub fn kind(&self) -> MutationKind {
    match self {
      SyncTag::ScoreSubmission => MutationKind::Score,
      SyncTag::TimerEvents => MutationKind::TimerEvent,
    }
  }

  pub fn for_kind(kind: MutationKind) -> Self {
    match kind {
      MutationKind::Score => SyncTag::ScoreSubmission,
      MutationKind::TimerEvent => SyncTag::TimerEvents,
    }
  }
}

/// External scheduling collaborator. The engine only asks for a tag to be
/// scheduled; it never assumes the trigger will actually fire, so
/// [`SyncCoordinator::replay`] doubles as the manual "sync now" path.
pub trait SyncScheduler: Send + Sync {
  fn request_sync(&self, tag: SyncTag);
}

/// Scheduler that drops every request. For hosts without deferred triggers.
pub struct NoopScheduler;

impl SyncScheduler for NoopScheduler {
  fn request_sync(&self, tag: SyncTag) {
    debug!(tag = tag.as_str(), "no scheduler configured, sync not deferred");
  }
}

/// Result of one replay trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
  /// The queue was drained; `remaining` records stay queued for retry
  Completed { delivered: usize, remaining: usize },
  /// Another replay for the same tag was already in flight
  AlreadyRunning,
}

/// Drains unsynced records for a tag, sequentially.
pub struct SyncCoordinator {
  origin: Arc<dyn Origin>,
  queue: OfflineQueue,
  base: Url,
  endpoints: SyncEndpoints,
  in_flight: Mutex<HashSet<SyncTag>>,
}

impl SyncCoordinator {
  pub fn new(
    origin: Arc<dyn Origin>,
    queue: OfflineQueue,
    base: Url,
    endpoints: SyncEndpoints,
  ) -> Self {
    Self {
      origin,
      queue,
      base,
      endpoints,
      in_flight: Mutex::new(HashSet::new()),
    }
  }

  /// Replay every unsynced record for the tag's kind.
  ///
  /// Single-flight per tag: a trigger arriving while the same tag is
  /// already replaying returns immediately without touching the network.
  pub async fn replay(&self, tag: SyncTag) -> Result<SyncOutcome> {
    {
      let mut in_flight = self
        .in_flight
        .lock()
        .map_err(|e| eyre!("Lock poisoned: {}", e))?;
      if !in_flight.insert(tag) {
        debug!(tag = tag.as_str(), "sync already in flight, skipping trigger");
        return Ok(SyncOutcome::AlreadyRunning);
      }
    }

    let outcome = self.drain(tag).await;

    if let Ok(mut in_flight) = self.in_flight.lock() {
      in_flight.remove(&tag);
    }

    outcome
  }

  async fn drain(&self, tag: SyncTag) -> Result<SyncOutcome> {
    let kind = tag.kind();
    let records = self.queue.list_unsynced(kind)?;
    let endpoint = self.endpoint_for(kind)?;

    let mut delivered = 0;
    let mut remaining = 0;

    // Sequential on purpose: bounds concurrent origin writes and keeps
    // duplicate-submission windows small.
    for record in records {
      let body = serde_json::to_vec(&record.payload)
        .map_err(|e| eyre!("Failed to serialize queued payload: {}", e))?;
      let request = Request::post(endpoint.clone(), body);

      match self.origin.fetch(&request).await {
        Ok(response) if response.is_success() => match self.queue.mark_synced(record.id) {
          Ok(()) => delivered += 1,
          Err(e) => {
            // The origin accepted but the flag write failed; the record
            // will be resubmitted on the next trigger (at-least-once).
            warn!(id = record.id, error = %e, "delivered mutation but failed to mark it synced");
            remaining += 1;
          }
        },
        Ok(response) => {
          debug!(
            id = record.id,
            status = response.status,
            "origin rejected queued mutation, leaving it queued"
          );
          remaining += 1;
        }
        Err(e) => {
          debug!(id = record.id, error = %e, "failed to deliver queued mutation, leaving it queued");
          remaining += 1;
        }
      }
    }

    if delivered > 0 || remaining > 0 {
      debug!(tag = tag.as_str(), delivered, remaining, "sync replay finished");
    }

    Ok(SyncOutcome::Completed {
      delivered,
      remaining,
    })
  }

  fn endpoint_for(&self, kind: MutationKind) -> Result<Url> {
    let path = match kind {
      MutationKind::Score => &self.endpoints.scores,
      MutationKind::TimerEvent => &self.endpoints.timer_events,
    };

    self
      .base
      .join(path)
      .map_err(|e| eyre!("Invalid sync endpoint {}: {}", path, e))
  }
}
