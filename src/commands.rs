//! Command channel between the host application and the engine.
//!
//! A closed set of variants with exhaustive handling - there is no
//! "unknown command" path to fall through at runtime.

use tokio::sync::oneshot;

use crate::queue::OfflineData;

/// Commands the host application can send to the engine.
#[derive(Debug)]
pub enum Command {
  /// Force immediate activation of the pending version
  SkipWaiting,
  /// Explicitly enqueue a score mutation record
  CacheScore(serde_json::Value),
  /// Explicitly enqueue a timer-event mutation record
  CacheTimerEvent(serde_json::Value),
  /// Request all unsynced records over the reply channel
  GetOfflineData { reply: oneshot::Sender<OfflineData> },
}
