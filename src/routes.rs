//! Deterministic route classification.
//!
//! Every intercepted request maps to exactly one category, checked in fixed
//! priority order against the configured path-prefix lists. Classification
//! is a pure function of the request descriptor and the policy.

use serde::Deserialize;

use crate::http::{Destination, Method, Request};

/// Category a request resolves to, which selects the strategy used for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteCategory {
  /// Reference data: serve from cache, revalidate in the background
  CacheFirst,
  /// Live data: prefer the network, fall back to cache
  NetworkFirst,
  /// Mutations and real-time endpoints: never served from cache
  NetworkOnly,
  /// Static assets (scripts, styles, images, fonts)
  Static,
  /// Document navigations
  Page,
  /// Everything else
  Dynamic,
}

/// Path-prefix lists driving classification, supplied at initialization.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutePolicy {
  pub api_prefix: String,
  pub network_only: Vec<String>,
  pub cache_first: Vec<String>,
  pub network_first: Vec<String>,
}

impl Default for RoutePolicy {
  fn default() -> Self {
    Self {
      api_prefix: "/api/".to_string(),
      network_only: vec![
        "/api/scores/submit".to_string(),
        "/api/timer/start".to_string(),
        "/api/timer/stop".to_string(),
      ],
      cache_first: vec![
        "/api/events".to_string(),
        "/api/teams".to_string(),
        "/api/divisions".to_string(),
        "/api/venues".to_string(),
      ],
      network_first: vec![
        "/api/leaderboard".to_string(),
        "/api/scores".to_string(),
        "/api/timer".to_string(),
        "/api/heats".to_string(),
      ],
    }
  }
}

/// File extensions treated as static assets outside the API prefix.
const STATIC_EXTENSIONS: &[&str] = &[
  "js", "css", "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "woff", "woff2", "ttf", "map",
];

/// Whether a request bypasses the engine entirely.
///
/// Non-GET requests outside the API prefix are not classified; they go to
/// the origin verbatim with no caching side effects.
pub fn is_passthrough(request: &Request, policy: &RoutePolicy) -> bool {
  request.method != Method::Get && !request.path().starts_with(&policy.api_prefix)
}

/// Classify a request. Prefix lists are checked in fixed priority order;
/// the extension and document checks only apply outside the API prefix.
pub fn classify(request: &Request, policy: &RoutePolicy) -> RouteCategory {
  let path = request.path();

  if matches_prefix(path, &policy.network_only) {
    return RouteCategory::NetworkOnly;
  }
  if matches_prefix(path, &policy.cache_first) {
    return RouteCategory::CacheFirst;
  }
  if matches_prefix(path, &policy.network_first) {
    return RouteCategory::NetworkFirst;
  }

  let under_api = path.starts_with(&policy.api_prefix);

  if !under_api && has_static_extension(path) {
    return RouteCategory::Static;
  }
  if !under_api && is_document_fetch(request) {
    return RouteCategory::Page;
  }
  if under_api {
    // Unknown API routes default to network-first
    return RouteCategory::NetworkFirst;
  }

  RouteCategory::Dynamic
}

fn matches_prefix(path: &str, prefixes: &[String]) -> bool {
  prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
}

fn has_static_extension(path: &str) -> bool {
  match path.rsplit_once('.') {
    Some((_, ext)) => STATIC_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
    None => false,
  }
}

fn is_document_fetch(request: &Request) -> bool {
  request.destination == Destination::Document
    || request
      .accept
      .as_deref()
      .is_some_and(|accept| accept.contains("text/html"))
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  fn get(path: &str) -> Request {
    Request::get(Url::parse(&format!("https://meet.example.com{}", path)).unwrap())
  }

  fn post(path: &str) -> Request {
    Request::post(
      Url::parse(&format!("https://meet.example.com{}", path)).unwrap(),
      Vec::new(),
    )
  }

  #[test]
  fn test_network_only_wins_over_network_first() {
    let policy = RoutePolicy::default();

    // /api/scores is a network-first prefix, but the submit route under it
    // must classify as network-only.
    assert_eq!(
      classify(&post("/api/scores/submit"), &policy),
      RouteCategory::NetworkOnly
    );
    assert_eq!(
      classify(&get("/api/scores"), &policy),
      RouteCategory::NetworkFirst
    );
  }

  #[test]
  fn test_cache_first_prefixes() {
    let policy = RoutePolicy::default();

    assert_eq!(classify(&get("/api/events"), &policy), RouteCategory::CacheFirst);
    assert_eq!(
      classify(&get("/api/teams/42"), &policy),
      RouteCategory::CacheFirst
    );
  }

  #[test]
  fn test_unknown_api_route_defaults_to_network_first() {
    let policy = RoutePolicy::default();

    assert_eq!(
      classify(&get("/api/announcements"), &policy),
      RouteCategory::NetworkFirst
    );
  }

  #[test]
  fn test_static_extension_outside_api() {
    let policy = RoutePolicy::default();

    assert_eq!(classify(&get("/app.js"), &policy), RouteCategory::Static);
    assert_eq!(
      classify(&get("/assets/logo.PNG"), &policy),
      RouteCategory::Static
    );
    // Extensions under the API prefix do not make a route static
    assert_eq!(
      classify(&get("/api/export.csv"), &policy),
      RouteCategory::NetworkFirst
    );
  }

  #[test]
  fn test_document_fetch_is_page() {
    let policy = RoutePolicy::default();

    let by_destination = get("/standings").with_destination(Destination::Document);
    assert_eq!(classify(&by_destination, &policy), RouteCategory::Page);

    let by_accept = get("/standings").with_accept("text/html,application/xhtml+xml");
    assert_eq!(classify(&by_accept, &policy), RouteCategory::Page);
  }

  #[test]
  fn test_everything_else_is_dynamic() {
    let policy = RoutePolicy::default();

    assert_eq!(classify(&get("/standings"), &policy), RouteCategory::Dynamic);
  }

  #[test]
  fn test_passthrough_rule() {
    let policy = RoutePolicy::default();

    // Non-GET outside the API prefix bypasses the engine
    assert!(is_passthrough(&post("/analytics/beacon"), &policy));
    // Non-GET under the API prefix is still classified
    assert!(!is_passthrough(&post("/api/scores/submit"), &policy));
    // GETs are always classified
    assert!(!is_passthrough(&get("/standings"), &policy));
  }
}
