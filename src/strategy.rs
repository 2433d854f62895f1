//! Cache/network resolution strategies.
//!
//! One method per route category. Every strategy resolves to some response
//! except cache-first, which has no offline fallback of its own and
//! propagates a transport failure on a cold cache.
//!
//! Only success (2xx) responses are ever cached, so a transient origin
//! error can never poison a partition. Responses are cloned before caching:
//! one copy goes to the caller, the other to the partition.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::CacheManager;
use crate::config::{PartitionLimits, PartitionNames};
use crate::http::{Request, Response};
use crate::origin::{FetchError, Origin};
use crate::queue::{MutationKind, OfflineQueue};
use crate::sync::{SyncScheduler, SyncTag};

pub struct StrategyEngine {
  cache: Arc<CacheManager>,
  origin: Arc<dyn Origin>,
  queue: OfflineQueue,
  scheduler: Arc<dyn SyncScheduler>,
  names: PartitionNames,
  limits: PartitionLimits,
  /// Side channel for swallowed background-revalidation failures, so they
  /// stay observable instead of vanishing into a detached task.
  revalidation_failures: Arc<AtomicU64>,
}

impl StrategyEngine {
  pub fn new(
    cache: Arc<CacheManager>,
    origin: Arc<dyn Origin>,
    queue: OfflineQueue,
    scheduler: Arc<dyn SyncScheduler>,
    names: PartitionNames,
    limits: PartitionLimits,
  ) -> Self {
    Self {
      cache,
      origin,
      queue,
      scheduler,
      names,
      limits,
      revalidation_failures: Arc::new(AtomicU64::new(0)),
    }
  }

  /// Count of background revalidations that failed since startup.
  pub fn revalidation_failures(&self) -> u64 {
    self.revalidation_failures.load(Ordering::Relaxed)
  }

  /// Cache-first with background revalidation, for reference data.
  ///
  /// A hit answers immediately and refreshes the entry in a detached task
  /// whose outcome the caller never observes. A miss goes to the origin;
  /// a transport failure on a miss is the one case with no fallback.
  pub async fn cache_first(&self, request: &Request) -> Result<Response, FetchError> {
    let key = request.cache_key();

    if let Some(hit) = self.lookup(&self.names.api, &key) {
      self.spawn_revalidate(request.clone());
      return Ok(hit);
    }

    let response = self.origin.fetch(request).await?;
    if response.is_success() {
      self.store(&self.names.api, &key, &response);
    }
    Ok(response)
  }

  /// Network-first, for live data. A non-success origin answer counts as a
  /// failure here: it is never returned or cached, the cached entry (or
  /// the synthetic 503) is.
  pub async fn network_first(&self, request: &Request) -> Response {
    let key = request.cache_key();

    match self.origin.fetch(request).await {
      Ok(response) if response.is_success() => {
        self.store(&self.names.api, &key, &response);
        response
      }
      Ok(response) => {
        debug!(
          path = request.path(),
          status = response.status,
          "origin rejected, serving cache"
        );
        self.cached_or(&self.names.api, &key, Response::offline_unavailable)
      }
      Err(e) => {
        debug!(path = request.path(), error = %e, "origin unreachable, serving cache");
        self.cached_or(&self.names.api, &key, Response::offline_unavailable)
      }
    }
  }

  /// Network-only, for mutations and real-time endpoints. Any answer from
  /// the origin is returned verbatim. On transport failure, a mutating
  /// request is captured into the offline queue and acknowledged with a
  /// 202; anything else gets the synthetic 503.
  pub async fn network_only(&self, request: &Request) -> Response {
    match self.origin.fetch(request).await {
      Ok(response) => response,
      Err(e) => {
        if let Some(kind) = MutationKind::from_path(request.path()) {
          debug!(path = request.path(), error = %e, "capturing mutation offline");
          let payload = request.json_body().unwrap_or(Value::Null);
          if self.queue.enqueue(kind, payload).is_some() {
            self.scheduler.request_sync(SyncTag::for_kind(kind));
          }
          Response::mutation_queued("Saved offline; will sync when connection returns")
        } else {
          debug!(path = request.path(), error = %e, "origin unreachable");
          Response::offline_unavailable()
        }
      }
    }
  }

  /// Cache-first without revalidation, for static assets.
  pub async fn static_asset(&self, request: &Request) -> Response {
    let key = request.cache_key();

    if let Some(hit) = self.lookup(&self.names.static_assets, &key) {
      return hit;
    }

    match self.origin.fetch(request).await {
      Ok(response) => {
        if response.is_success() {
          self.store(&self.names.static_assets, &key, &response);
        }
        response
      }
      Err(e) => {
        debug!(path = request.path(), error = %e, "static asset unavailable");
        Response::offline_unavailable()
      }
    }
  }

  /// Network-first against the dynamic partition, for document
  /// navigations. The last-resort fallback is an HTML document rather
  /// than the JSON 503.
  pub async fn page(&self, request: &Request) -> Response {
    let key = request.cache_key();

    match self.origin.fetch(request).await {
      Ok(response) if response.is_success() => {
        self.store(&self.names.dynamic, &key, &response);
        response
      }
      Ok(response) => {
        debug!(
          path = request.path(),
          status = response.status,
          "page fetch rejected, serving cache"
        );
        self.cached_or(&self.names.dynamic, &key, Response::offline_page)
      }
      Err(e) => {
        debug!(path = request.path(), error = %e, "page fetch failed, serving cache");
        self.cached_or(&self.names.dynamic, &key, Response::offline_page)
      }
    }
  }

  /// Network-first against the dynamic partition, with the partition's
  /// eviction policy applied before each insert.
  pub async fn dynamic(&self, request: &Request) -> Response {
    let key = request.cache_key();

    match self.origin.fetch(request).await {
      Ok(response) if response.is_success() => {
        if let Err(e) = self.cache.evict_if_needed(&self.names.dynamic, self.limits.dynamic) {
          warn!(partition = %self.names.dynamic, error = %e, "eviction failed");
        }
        self.store(&self.names.dynamic, &key, &response);
        response
      }
      Ok(response) => {
        debug!(
          path = request.path(),
          status = response.status,
          "origin rejected, serving cache"
        );
        self.cached_or(&self.names.dynamic, &key, Response::offline_unavailable)
      }
      Err(e) => {
        debug!(path = request.path(), error = %e, "origin unreachable, serving cache");
        self.cached_or(&self.names.dynamic, &key, Response::offline_unavailable)
      }
    }
  }

  /// Cache lookup that treats manager failures as misses.
  fn lookup(&self, partition: &str, key: &str) -> Option<Response> {
    match self.cache.get(partition, key) {
      Ok(hit) => hit,
      Err(e) => {
        warn!(partition, error = %e, "cache read failed, treating as miss");
        None
      }
    }
  }

  fn cached_or(&self, partition: &str, key: &str, fallback: fn() -> Response) -> Response {
    self.lookup(partition, key).unwrap_or_else(fallback)
  }

  /// Store a copy of the response; the caller keeps the original. Write
  /// failures must not fail the in-flight request.
  fn store(&self, partition: &str, key: &str, response: &Response) {
    if let Err(e) = self.cache.put(partition, key, response.clone()) {
      warn!(partition, error = %e, "cache write failed");
    }
  }

  /// Refresh a cached entry in a detached task. Nothing is awaited or
  /// reported to the caller; failures land in the side channel.
  fn spawn_revalidate(&self, request: Request) {
    let origin = Arc::clone(&self.origin);
    let cache = Arc::clone(&self.cache);
    let partition = self.names.api.clone();
    let failures = Arc::clone(&self.revalidation_failures);

    tokio::spawn(async move {
      let key = request.cache_key();
      match origin.fetch(&request).await {
        Ok(response) if response.is_success() => {
          if let Err(e) = cache.put(&partition, &key, response) {
            failures.fetch_add(1, Ordering::Relaxed);
            warn!(partition = %partition, error = %e, "revalidation write failed");
          }
        }
        Ok(response) => {
          failures.fetch_add(1, Ordering::Relaxed);
          warn!(
            path = request.path(),
            status = response.status,
            "background revalidation rejected"
          );
        }
        Err(e) => {
          failures.fetch_add(1, Ordering::Relaxed);
          warn!(path = request.path(), error = %e, "background revalidation failed");
        }
      }
    });
  }
}
