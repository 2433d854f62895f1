//! Engine facade: classification, strategy dispatch, command handling.

use std::sync::Arc;
use std::time::Duration;

use color_eyre::Result;
use tracing::warn;

use crate::cache::CacheManager;
use crate::commands::Command;
use crate::config::EngineConfig;
use crate::db::{QueueStore, SqliteStore};
use crate::http::{Request, Response};
use crate::lifecycle::{EngineState, Lifecycle};
use crate::origin::{FetchError, HttpOrigin, Origin};
use crate::queue::{MutationKind, OfflineQueue};
use crate::routes::{self, RouteCategory};
use crate::strategy::StrategyEngine;
use crate::sync::{NoopScheduler, SyncCoordinator, SyncOutcome, SyncScheduler, SyncTag};

/// The offline engine. One instance serves every intercepted request of a
/// client session.
pub struct Engine {
  config: EngineConfig,
  cache: Arc<CacheManager>,
  origin: Arc<dyn Origin>,
  strategies: StrategyEngine,
  queue: OfflineQueue,
  sync: SyncCoordinator,
  lifecycle: Lifecycle,
  scheduler: Arc<dyn SyncScheduler>,
}

impl Engine {
  /// Wire an engine from explicit collaborators.
  pub fn new(
    config: EngineConfig,
    origin: Arc<dyn Origin>,
    store: Arc<dyn QueueStore>,
    scheduler: Arc<dyn SyncScheduler>,
  ) -> Result<Self> {
    let cache = Arc::new(CacheManager::new());
    let names = config.partition_names();
    cache.open(&names.static_assets, config.limits.static_assets)?;
    cache.open(&names.dynamic, config.limits.dynamic)?;
    cache.open(&names.api, config.limits.api)?;

    let queue = OfflineQueue::new(store);
    let strategies = StrategyEngine::new(
      Arc::clone(&cache),
      Arc::clone(&origin),
      queue.clone(),
      Arc::clone(&scheduler),
      names,
      config.limits,
    );
    let sync = SyncCoordinator::new(
      Arc::clone(&origin),
      queue.clone(),
      config.base_url()?,
      config.sync.clone(),
    );
    let lifecycle = Lifecycle::new(Arc::clone(&cache), Arc::clone(&origin), &config)?;

    Ok(Self {
      config,
      cache,
      origin,
      strategies,
      queue,
      sync,
      lifecycle,
      scheduler,
    })
  }

  /// Wire an engine against the real origin and the durable SQLite queue,
  /// without a deferred-trigger scheduler.
  pub fn with_defaults(config: EngineConfig) -> Result<Self> {
    let origin = Arc::new(HttpOrigin::new(Duration::from_secs(
      config.request_timeout_secs,
    ))?);
    let store = Arc::new(SqliteStore::open()?);
    Self::new(config, origin, store, Arc::new(NoopScheduler))
  }

  /// Install (seed caches) and activate (prune stale versions) in one go.
  pub async fn start(&self) -> Result<()> {
    self.lifecycle.install().await?;
    self.lifecycle.activate().await
  }

  pub fn state(&self) -> EngineState {
    self.lifecycle.state()
  }

  pub fn cache(&self) -> &CacheManager {
    &self.cache
  }

  /// Count of swallowed background-revalidation failures.
  pub fn revalidation_failures(&self) -> u64 {
    self.strategies.revalidation_failures()
  }

  /// Resolve one intercepted request.
  ///
  /// Non-GET requests outside the API prefix pass through to the origin
  /// verbatim. Everything else is classified and dispatched; the only
  /// error that can surface is a cache-first transport failure with a
  /// cold cache.
  pub async fn handle_request(&self, request: &Request) -> Result<Response, FetchError> {
    if routes::is_passthrough(request, &self.config.routes) {
      return self.origin.fetch(request).await;
    }

    match routes::classify(request, &self.config.routes) {
      RouteCategory::CacheFirst => self.strategies.cache_first(request).await,
      RouteCategory::NetworkFirst => Ok(self.strategies.network_first(request).await),
      RouteCategory::NetworkOnly => Ok(self.strategies.network_only(request).await),
      RouteCategory::Static => Ok(self.strategies.static_asset(request).await),
      RouteCategory::Page => Ok(self.strategies.page(request).await),
      RouteCategory::Dynamic => Ok(self.strategies.dynamic(request).await),
    }
  }

  /// Service one host command. Exhaustive over the command set.
  pub async fn handle_command(&self, command: Command) {
    match command {
      Command::SkipWaiting => {
        if let Err(e) = self.lifecycle.activate().await {
          warn!(error = %e, "failed to activate pending version");
        }
      }
      Command::CacheScore(payload) => {
        if self.queue.enqueue(MutationKind::Score, payload).is_some() {
          self.scheduler.request_sync(SyncTag::ScoreSubmission);
        }
      }
      Command::CacheTimerEvent(payload) => {
        if self.queue.enqueue(MutationKind::TimerEvent, payload).is_some() {
          self.scheduler.request_sync(SyncTag::TimerEvents);
        }
      }
      Command::GetOfflineData { reply } => {
        // Receiver may already be gone; nothing useful to do then
        let _ = reply.send(self.queue.snapshot());
      }
    }
  }

  /// Manual "sync now": replay the queue for a tag without waiting for a
  /// deferred trigger.
  pub async fn sync_now(&self, tag: SyncTag) -> Result<SyncOutcome> {
    self.sync.replay(tag).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::MemoryStore;
  use crate::testutil::{get, url, MockOrigin, RecordingScheduler};
  use serde_json::json;
  use tokio::sync::oneshot;

  struct Fixture {
    origin: Arc<MockOrigin>,
    scheduler: Arc<RecordingScheduler>,
    engine: Engine,
  }

  fn fixture() -> Fixture {
    crate::testutil::init_tracing();

    let origin = Arc::new(MockOrigin::new());
    let scheduler = Arc::new(RecordingScheduler::new());
    let config = EngineConfig::for_origin("https://meet.example.com");

    let engine = Engine::new(
      config,
      origin.clone() as Arc<dyn Origin>,
      Arc::new(MemoryStore::new()) as Arc<dyn QueueStore>,
      scheduler.clone() as Arc<dyn SyncScheduler>,
    )
    .unwrap();

    Fixture {
      origin,
      scheduler,
      engine,
    }
  }

  fn seed_precache(f: &Fixture) {
    for asset in &f.engine.config.precache {
      f.origin.respond(asset, Response::json(200, &json!({ "asset": asset })));
    }
  }

  async fn offline_data(engine: &Engine) -> crate::queue::OfflineData {
    let (tx, rx) = oneshot::channel();
    engine.handle_command(Command::GetOfflineData { reply: tx }).await;
    rx.await.unwrap()
  }

  #[tokio::test]
  async fn test_queued_score_syncs_end_to_end() {
    let f = fixture();

    // Score submission fails while offline: captured, acknowledged 202
    f.origin.set_offline(true);
    let submit = Request::post(
      url("/api/scores/submit"),
      serde_json::to_vec(&json!({ "team": 7, "points": 42 })).unwrap(),
    );
    let response = f.engine.handle_request(&submit).await.unwrap();
    assert_eq!(response.status, 202);
    assert_eq!(response.json_body().unwrap()["queued"], true);
    assert_eq!(f.scheduler.requested(), vec![SyncTag::ScoreSubmission]);

    let pending = offline_data(&f.engine).await;
    assert_eq!(pending.scores.len(), 1);

    // Connectivity returns; the trigger fires
    f.origin.set_offline(false);
    f.origin
      .respond("/api/scores/submit", Response::json(200, &json!({ "accepted": true })));

    let outcome = f.engine.sync_now(SyncTag::ScoreSubmission).await.unwrap();
    assert_eq!(
      outcome,
      SyncOutcome::Completed {
        delivered: 1,
        remaining: 0
      }
    );

    // The synced record no longer shows up in the offline snapshot
    let drained = offline_data(&f.engine).await;
    assert!(drained.scores.is_empty());
  }

  #[tokio::test]
  async fn test_host_commands_enqueue_and_request_sync() {
    let f = fixture();

    f.engine
      .handle_command(Command::CacheScore(json!({ "points": 3 })))
      .await;
    f.engine
      .handle_command(Command::CacheTimerEvent(json!({ "action": "stop" })))
      .await;

    let pending = offline_data(&f.engine).await;
    assert_eq!(pending.scores.len(), 1);
    assert_eq!(pending.timer_events.len(), 1);
    assert_eq!(
      f.scheduler.requested(),
      vec![SyncTag::ScoreSubmission, SyncTag::TimerEvents]
    );
  }

  #[tokio::test]
  async fn test_passthrough_bypasses_cache_and_queue() {
    let f = fixture();
    f.origin.set_offline(true);

    let beacon = Request::post(url("/analytics/beacon"), b"{}".to_vec());
    let result = f.engine.handle_request(&beacon).await;

    // Untouched: the transport failure surfaces as-is
    assert!(matches!(result, Err(FetchError::Unreachable(_))));
    let pending = offline_data(&f.engine).await;
    assert!(pending.scores.is_empty());
    assert!(pending.timer_events.is_empty());
  }

  #[tokio::test]
  async fn test_start_then_offline_sentinel_is_served() {
    let f = fixture();
    seed_precache(&f);

    f.engine.start().await.unwrap();
    assert_eq!(f.engine.state(), EngineState::Active);

    // Origin gone: the diagnostic route answers from the seeded sentinel
    f.origin.set_offline(true);
    let response = f
      .engine
      .handle_request(&get("/api/offline-status"))
      .await
      .unwrap();
    let body = response.json_body().unwrap();
    assert_eq!(body["offline"], true);
    assert_eq!(body["version"], "v1");
  }

  #[tokio::test]
  async fn test_static_route_is_served_from_cache_after_first_fetch() {
    let f = fixture();
    f.origin.respond("/app.js", Response::json(200, &json!({ "bundle": 1 })));

    f.engine.handle_request(&get("/app.js")).await.unwrap();
    f.engine.handle_request(&get("/app.js")).await.unwrap();

    assert_eq!(f.origin.call_count("/app.js"), 1);
  }

  #[tokio::test]
  async fn test_skip_waiting_activates() {
    let f = fixture();
    assert_eq!(f.engine.state(), EngineState::New);

    f.engine.handle_command(Command::SkipWaiting).await;
    assert_eq!(f.engine.state(), EngineState::Active);
  }
}
