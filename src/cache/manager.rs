//! Partition manager: the single owner of all cache partitions.
//!
//! Concurrent strategy tasks serialize on the manager's lock, so no
//! read-modify-write on a partition happens outside it.

use std::collections::HashMap;
use std::sync::Mutex;

use color_eyre::{eyre::eyre, Result};

use crate::cache::Partition;
use crate::http::Response;

/// Injectable service instance owning every partition. Partitions are
/// opened with constructor-supplied limits, not hard-coded constants.
pub struct CacheManager {
  partitions: Mutex<HashMap<String, Partition>>,
}

impl CacheManager {
  pub fn new() -> Self {
    Self {
      partitions: Mutex::new(HashMap::new()),
    }
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Partition>>> {
    self
      .partitions
      .lock()
      .map_err(|e| eyre!("Cache lock poisoned: {}", e))
  }

  /// Open a partition, creating it if absent. Idempotent: reopening an
  /// existing partition keeps its entries and original limit.
  pub fn open(&self, name: &str, max_entries: usize) -> Result<()> {
    let mut partitions = self.lock()?;
    partitions
      .entry(name.to_string())
      .or_insert_with(|| Partition::new(name, max_entries));
    Ok(())
  }

  pub fn get(&self, partition: &str, key: &str) -> Result<Option<Response>> {
    let partitions = self.lock()?;
    Ok(partitions.get(partition).and_then(|p| p.get(key)))
  }

  pub fn put(&self, partition: &str, key: &str, response: Response) -> Result<()> {
    let mut partitions = self.lock()?;
    let partition = partitions
      .get_mut(partition)
      .ok_or_else(|| eyre!("No such cache partition: {}", partition))?;
    partition.put(key, response);
    Ok(())
  }

  pub fn delete(&self, partition: &str, key: &str) -> Result<bool> {
    let mut partitions = self.lock()?;
    let partition = partitions
      .get_mut(partition)
      .ok_or_else(|| eyre!("No such cache partition: {}", partition))?;
    Ok(partition.delete(key))
  }

  /// Keys of a partition in insertion order.
  pub fn list_keys(&self, partition: &str) -> Result<Vec<String>> {
    let partitions = self.lock()?;
    Ok(
      partitions
        .get(partition)
        .map(|p| p.keys())
        .unwrap_or_default(),
    )
  }

  pub fn len(&self, partition: &str) -> Result<usize> {
    let partitions = self.lock()?;
    Ok(partitions.get(partition).map(|p| p.len()).unwrap_or(0))
  }

  /// Apply the FIFO eviction policy to a partition ahead of an insert.
  pub fn evict_if_needed(&self, partition: &str, max_entries: usize) -> Result<()> {
    let mut partitions = self.lock()?;
    if let Some(partition) = partitions.get_mut(partition) {
      partition.evict_if_needed(max_entries);
    }
    Ok(())
  }

  /// Names of all existing partitions.
  pub fn partition_names(&self) -> Result<Vec<String>> {
    let partitions = self.lock()?;
    Ok(partitions.keys().cloned().collect())
  }

  /// Delete a whole partition. Returns whether it existed.
  pub fn delete_partition(&self, name: &str) -> Result<bool> {
    let mut partitions = self.lock()?;
    Ok(partitions.remove(name).is_some())
  }
}

impl Default for CacheManager {
  fn default() -> Self {
    Self::new()
  }
}
