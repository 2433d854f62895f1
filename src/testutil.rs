//! Shared stub collaborators for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::json;
use url::Url;

use crate::http::{Request, Response};
use crate::origin::{BoxFuture, FetchError, Origin};
use crate::sync::{SyncScheduler, SyncTag};

/// Install a test subscriber once so RUST_LOG surfaces engine logs.
pub fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
}

pub fn url(path: &str) -> Url {
  Url::parse(&format!("https://meet.example.com{}", path)).unwrap()
}

pub fn get(path: &str) -> Request {
  Request::get(url(path))
}

/// Origin stub with scripted per-path outcomes and a recorded call log.
#[derive(Default)]
pub struct MockOrigin {
  sticky: Mutex<HashMap<String, Result<Response, FetchError>>>,
  scripted: Mutex<HashMap<String, VecDeque<Result<Response, FetchError>>>>,
  offline: AtomicBool,
  delay: Mutex<Option<Duration>>,
  calls: Mutex<Vec<String>>,
}

impl MockOrigin {
  pub fn new() -> Self {
    Self::default()
  }

  /// Always answer `path` with this response.
  pub fn respond(&self, path: &str, response: Response) {
    self
      .sticky
      .lock()
      .unwrap()
      .insert(path.to_string(), Ok(response));
  }

  /// Always fail `path` at the transport level.
  pub fn fail(&self, path: &str) {
    self.sticky.lock().unwrap().insert(
      path.to_string(),
      Err(FetchError::Unreachable("connection refused".to_string())),
    );
  }

  /// Answer `path` with these outcomes in order, then fall back to the
  /// sticky response (or a 404).
  pub fn script(&self, path: &str, outcomes: Vec<Result<Response, FetchError>>) {
    self
      .scripted
      .lock()
      .unwrap()
      .insert(path.to_string(), outcomes.into());
  }

  /// Simulate total connectivity loss.
  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  /// Delay every fetch, to hold requests in flight.
  pub fn set_delay(&self, delay: Duration) {
    *self.delay.lock().unwrap() = Some(delay);
  }

  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

  pub fn call_count(&self, path: &str) -> usize {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|p| p.as_str() == path)
      .count()
  }
}

impl Origin for MockOrigin {
  fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response, FetchError>> {
    Box::pin(async move {
      let path = request.path().to_string();
      self.calls.lock().unwrap().push(path.clone());

      let delay = *self.delay.lock().unwrap();
      if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
      }

      if self.offline.load(Ordering::SeqCst) {
        return Err(FetchError::Unreachable("offline".to_string()));
      }

      if let Some(outcomes) = self.scripted.lock().unwrap().get_mut(&path) {
        if let Some(outcome) = outcomes.pop_front() {
          return outcome;
        }
      }

      match self.sticky.lock().unwrap().get(&path) {
        Some(outcome) => outcome.clone(),
        None => Ok(Response::json(404, &json!({ "error": "not found" }))),
      }
    })
  }
}

/// Scheduler stub recording requested sync tags.
#[derive(Default)]
pub struct RecordingScheduler {
  tags: Mutex<Vec<SyncTag>>,
}

impl RecordingScheduler {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn requested(&self) -> Vec<SyncTag> {
    self.tags.lock().unwrap().clone()
  }
}

impl SyncScheduler for RecordingScheduler {
  fn request_sync(&self, tag: SyncTag) {
    self.tags.lock().unwrap().push(tag);
  }
}
