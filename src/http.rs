//! Request and response snapshots exchanged with the engine.
//!
//! Responses are owned snapshots (status + headers + body) so one copy can
//! be handed to the caller while another is stored in a cache partition.

use serde_json::json;
use sha2::{Digest, Sha256};
use url::Url;

/// HTTP method of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Head,
  Post,
  Put,
  Patch,
  Delete,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Head => "HEAD",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
    }
  }
}

/// Declared destination of a request, as reported by the intercepting
/// transport (the equivalent of a fetch request's `destination`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
  Document,
  Script,
  Style,
  Image,
  Font,
  Other,
}

/// An intercepted outbound request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  /// Accept header, if the client sent one
  pub accept: Option<String>,
  pub destination: Destination,
  /// Request body for mutating requests
  pub body: Option<Vec<u8>>,
}

impl Request {
  /// Create a GET request for the given URL.
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::Get,
      url,
      accept: None,
      destination: Destination::Other,
      body: None,
    }
  }

  /// Create a POST request carrying a body.
  pub fn post(url: Url, body: Vec<u8>) -> Self {
    Self {
      method: Method::Post,
      url,
      accept: None,
      destination: Destination::Other,
      body: Some(body),
    }
  }

  pub fn with_accept(mut self, accept: &str) -> Self {
    self.accept = Some(accept.to_string());
    self
  }

  pub fn with_destination(mut self, destination: Destination) -> Self {
    self.destination = destination;
    self
  }

  /// URL path component.
  pub fn path(&self) -> &str {
    self.url.path()
  }

  /// Normalized cache key for this request (method + URL).
  ///
  /// SHA256 hash for stable, fixed-length keys.
  pub fn cache_key(&self) -> String {
    let input = format!("{}:{}", self.method.as_str(), self.url);
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }

  /// Parse the request body as JSON, if present and well-formed.
  pub fn json_body(&self) -> Option<serde_json::Value> {
    self
      .body
      .as_deref()
      .and_then(|bytes| serde_json::from_slice(bytes).ok())
  }
}

/// An owned response snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  /// Build a JSON response with the given status.
  pub fn json(status: u16, value: &serde_json::Value) -> Self {
    Self {
      status,
      headers: vec![("content-type".to_string(), "application/json".to_string())],
      body: serde_json::to_vec(value).unwrap_or_default(),
    }
  }

  /// Whether the status signals success (2xx).
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Value of the first header with the given name (case-insensitive).
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Parse the body as JSON.
  pub fn json_body(&self) -> Option<serde_json::Value> {
    serde_json::from_slice(&self.body).ok()
  }

  /// Synthetic 503 returned when the origin is unreachable and no cached
  /// entry exists.
  pub fn offline_unavailable() -> Self {
    Self::json(503, &json!({ "error": "Network unavailable", "offline": true }))
  }

  /// Synthetic 202 returned when a mutating request was captured into the
  /// offline queue instead of being delivered.
  pub fn mutation_queued(message: &str) -> Self {
    Self::json(
      202,
      &json!({
        "success": false,
        "offline": true,
        "queued": true,
        "message": message,
      }),
    )
  }

  /// Diagnostic sentinel entry seeded into the api partition at install.
  pub fn offline_sentinel(version: &str) -> Self {
    Self::json(
      200,
      &json!({
        "offline": true,
        "timestamp": chrono::Utc::now().timestamp_millis(),
        "version": version,
      }),
    )
  }

  /// Synthetic offline document returned when a page navigation fails and
  /// nothing is cached. Distinct content type from the JSON fallbacks.
  pub fn offline_page() -> Self {
    let body = "<!DOCTYPE html>\n\
      <html>\n\
      <head><meta charset=\"utf-8\"><title>Offline</title></head>\n\
      <body>\n\
      <h1>You are offline</h1>\n\
      <p>This page is not available without a connection.</p>\n\
      <button onclick=\"location.reload()\">Retry</button>\n\
      </body>\n\
      </html>\n";
    Self {
      status: 503,
      headers: vec![("content-type".to_string(), "text/html".to_string())],
      body: body.as_bytes().to_vec(),
    }
  }
}
