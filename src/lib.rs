//! Offline-first cache and sync engine for competition meet clients.
//!
//! The engine sits between a client application and its origin. Every
//! intercepted request is classified into a route category, resolved by
//! the matching cache/network strategy against bounded cache partitions,
//! and mutating requests that cannot reach the origin are captured into a
//! durable queue and replayed (at-least-once) when a sync trigger fires.
//!
//! Entry points: [`Engine`] for request and command handling,
//! [`EngineConfig`] for the route policy and partition limits.

pub mod cache;
pub mod commands;
pub mod config;
pub mod db;
pub mod engine;
pub mod http;
pub mod lifecycle;
pub mod origin;
pub mod queue;
pub mod routes;
pub mod strategy;
pub mod sync;

#[cfg(test)]
mod testutil;

pub use commands::Command;
pub use config::EngineConfig;
pub use engine::Engine;
pub use http::{Request, Response};
pub use queue::{MutationKind, OfflineData, QueuedMutation};
pub use routes::RouteCategory;
pub use sync::{SyncOutcome, SyncTag};
