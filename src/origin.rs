//! Network-fetch collaborator.
//!
//! Strategies talk to the origin through the [`Origin`] trait so tests can
//! script outcomes; [`HttpOrigin`] is the reqwest-backed implementation.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};

use crate::http::{Method, Request, Response};

/// A boxed future returned by trait methods
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Failure to obtain any response from the origin.
///
/// A non-success HTTP status is not a `FetchError` - the origin answered,
/// and strategies branch on [`Response::is_success`]. `Rejected` exists for
/// callers that need to treat a status as a failure in their own right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
  /// Transport-level failure: the origin could not be reached
  Unreachable(String),
  /// The origin answered with a status the caller considers a failure
  Rejected(u16),
}

impl std::fmt::Display for FetchError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      FetchError::Unreachable(reason) => write!(f, "Origin unreachable: {}", reason),
      FetchError::Rejected(status) => write!(f, "Origin rejected request with status {}", status),
    }
  }
}

impl std::error::Error for FetchError {}

/// Something that can resolve a request against the origin.
pub trait Origin: Send + Sync {
  fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response, FetchError>>;
}

/// Origin backed by a reqwest client.
///
/// The request timeout bounds hung fetches - without it a dead origin
/// would block a strategy indefinitely.
pub struct HttpOrigin {
  client: reqwest::Client,
}

impl HttpOrigin {
  pub fn new(timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self { client })
  }

  async fn fetch_inner(&self, request: &Request) -> Result<Response, FetchError> {
    let method = match request.method {
      Method::Get => reqwest::Method::GET,
      Method::Head => reqwest::Method::HEAD,
      Method::Post => reqwest::Method::POST,
      Method::Put => reqwest::Method::PUT,
      Method::Patch => reqwest::Method::PATCH,
      Method::Delete => reqwest::Method::DELETE,
    };

    let mut builder = self.client.request(method, request.url.clone());
    if let Some(accept) = &request.accept {
      builder = builder.header("accept", accept);
    }
    if let Some(body) = &request.body {
      builder = builder
        .header("content-type", "application/json")
        .body(body.clone());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| FetchError::Unreachable(e.to_string()))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .map(|(name, value)| {
        (
          name.as_str().to_string(),
          String::from_utf8_lossy(value.as_bytes()).to_string(),
        )
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| FetchError::Unreachable(e.to_string()))?
      .to_vec();

    Ok(Response {
      status,
      headers,
      body,
    })
  }
}

impl Origin for HttpOrigin {
  fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response, FetchError>> {
    Box::pin(self.fetch_inner(request))
  }
}
