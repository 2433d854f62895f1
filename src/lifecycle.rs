//! Install and activation of an engine version.
//!
//! Install seeds the static partition with the critical asset set and
//! plants the diagnostic sentinel; activation prunes partitions left over
//! from previous versions and makes this version authoritative.

use std::sync::{Arc, Mutex};

use color_eyre::{eyre::eyre, Result};
use tracing::debug;
use url::Url;

use crate::cache::CacheManager;
use crate::config::{EngineConfig, PartitionNames};
use crate::http::{Request, Response};
use crate::origin::Origin;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
  New,
  Installed,
  Active,
}

pub struct Lifecycle {
  cache: Arc<CacheManager>,
  origin: Arc<dyn Origin>,
  base: Url,
  precache: Vec<String>,
  api_prefix: String,
  names: PartitionNames,
  version: String,
  state: Mutex<EngineState>,
}

impl Lifecycle {
  pub fn new(cache: Arc<CacheManager>, origin: Arc<dyn Origin>, config: &EngineConfig) -> Result<Self> {
    Ok(Self {
      cache,
      origin,
      base: config.base_url()?,
      precache: config.precache.clone(),
      api_prefix: config.routes.api_prefix.clone(),
      names: config.partition_names(),
      version: config.version.clone(),
      state: Mutex::new(EngineState::New),
    })
  }

  pub fn state(&self) -> EngineState {
    self.state.lock().map(|s| *s).unwrap_or(EngineState::New)
  }

  /// Seed the static partition with every critical asset and plant the
  /// offline-status sentinel. All assets must land, or the install is
  /// incomplete and reported as an error.
  ///
  /// Completes without waiting on anything else, so the engine can be
  /// activated immediately afterwards instead of idling behind a
  /// still-running predecessor.
  pub async fn install(&self) -> Result<()> {
    for asset in &self.precache {
      let target = self
        .base
        .join(asset)
        .map_err(|e| eyre!("Invalid precache asset {}: {}", asset, e))?;
      let request = Request::get(target);

      let response = self
        .origin
        .fetch(&request)
        .await
        .map_err(|e| eyre!("Failed to precache {}: {}", asset, e))?;
      if !response.is_success() {
        return Err(eyre!("Failed to precache {}: status {}", asset, response.status));
      }

      self
        .cache
        .put(&self.names.static_assets, &request.cache_key(), response)?;
    }

    // Diagnostic sentinel, served from cache when the origin is down
    let sentinel = self.sentinel_request()?;
    self.cache.put(
      &self.names.api,
      &sentinel.cache_key(),
      Response::offline_sentinel(&self.version),
    )?;

    self.set_state(EngineState::Installed)?;
    debug!(version = %self.version, assets = self.precache.len(), "engine installed");

    Ok(())
  }

  /// Delete every partition that does not belong to this version, then
  /// take over request handling immediately.
  pub async fn activate(&self) -> Result<()> {
    let expected = self.names.all();

    for name in self.cache.partition_names()? {
      if !expected.contains(&name.as_str()) {
        self.cache.delete_partition(&name)?;
        debug!(partition = %name, "pruned stale cache partition");
      }
    }

    self.set_state(EngineState::Active)?;
    debug!(version = %self.version, "engine active");

    Ok(())
  }

  fn sentinel_request(&self) -> Result<Request> {
    let path = format!("{}offline-status", self.api_prefix);
    let target = self
      .base
      .join(&path)
      .map_err(|e| eyre!("Invalid sentinel path {}: {}", path, e))?;
    Ok(Request::get(target))
  }

  fn set_state(&self, state: EngineState) -> Result<()> {
    let mut current = self
      .state
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    *current = state;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testutil::MockOrigin;
  use serde_json::json;

  fn fixture() -> (Arc<MockOrigin>, Arc<CacheManager>, Lifecycle, EngineConfig) {
    let origin = Arc::new(MockOrigin::new());
    let cache = Arc::new(CacheManager::new());
    let config = EngineConfig::for_origin("https://meet.example.com");

    let names = config.partition_names();
    cache.open(&names.static_assets, config.limits.static_assets).unwrap();
    cache.open(&names.dynamic, config.limits.dynamic).unwrap();
    cache.open(&names.api, config.limits.api).unwrap();

    let lifecycle = Lifecycle::new(
      Arc::clone(&cache),
      origin.clone() as Arc<dyn Origin>,
      &config,
    )
    .unwrap();

    (origin, cache, lifecycle, config)
  }

  fn seed_origin(origin: &MockOrigin, config: &EngineConfig) {
    for asset in &config.precache {
      origin.respond(asset, Response::json(200, &json!({ "asset": asset })));
    }
  }

  #[tokio::test]
  async fn test_install_seeds_assets_and_sentinel() {
    let (origin, cache, lifecycle, config) = fixture();
    seed_origin(&origin, &config);

    lifecycle.install().await.unwrap();

    let names = config.partition_names();
    assert_eq!(
      cache.len(&names.static_assets).unwrap(),
      config.precache.len()
    );

    // Sentinel is keyed like a GET of the offline-status route
    let sentinel_key =
      Request::get(Url::parse("https://meet.example.com/api/offline-status").unwrap()).cache_key();
    let sentinel = cache.get(&names.api, &sentinel_key).unwrap().unwrap();
    let body = sentinel.json_body().unwrap();
    assert_eq!(body["offline"], true);
    assert_eq!(body["version"], "v1");

    assert_eq!(lifecycle.state(), EngineState::Installed);
  }

  #[tokio::test]
  async fn test_install_fails_when_any_asset_fails() {
    let (origin, _cache, lifecycle, config) = fixture();
    seed_origin(&origin, &config);
    origin.respond("/offline.html", Response::json(404, &json!({})));

    assert!(lifecycle.install().await.is_err());
    assert_eq!(lifecycle.state(), EngineState::New);
  }

  #[tokio::test]
  async fn test_install_fails_when_origin_unreachable() {
    let (origin, _cache, lifecycle, _config) = fixture();
    origin.set_offline(true);

    assert!(lifecycle.install().await.is_err());
  }

  #[tokio::test]
  async fn test_activate_prunes_stale_partitions() {
    let (_origin, cache, lifecycle, config) = fixture();

    // Leftovers from a previous version
    cache.open("meetsync-static-v0", 10).unwrap();
    cache.open("meetsync-api-v0", 10).unwrap();

    lifecycle.activate().await.unwrap();

    let mut names = cache.partition_names().unwrap();
    names.sort();
    let expected = config.partition_names();
    let mut want = vec![
      expected.api.clone(),
      expected.dynamic.clone(),
      expected.static_assets.clone(),
    ];
    want.sort();
    assert_eq!(names, want);
    assert_eq!(lifecycle.state(), EngineState::Active);
  }
}
