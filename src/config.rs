use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::routes::RoutePolicy;

/// Engine configuration: route policy, partition limits, precache list,
/// sync endpoints. Supplied by the host at initialization, either built
/// directly or loaded from a YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
  /// Origin base URL (e.g. "https://meet.example.com")
  pub origin: String,
  /// Engine version; partition names are suffixed with it so activation
  /// of a new version prunes the old partitions
  #[serde(default = "default_version")]
  pub version: String,
  #[serde(default)]
  pub routes: RoutePolicy,
  #[serde(default)]
  pub limits: PartitionLimits,
  /// Critical assets seeded into the static partition at install
  #[serde(default = "default_precache")]
  pub precache: Vec<String>,
  #[serde(default)]
  pub sync: SyncEndpoints,
  /// Bound on a single origin fetch, in seconds
  #[serde(default = "default_request_timeout_secs")]
  pub request_timeout_secs: u64,
}

/// Per-partition entry limits. Policy input, not constants inside the
/// partition manager.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PartitionLimits {
  pub static_assets: usize,
  pub dynamic: usize,
  pub api: usize,
}

impl Default for PartitionLimits {
  fn default() -> Self {
    Self {
      static_assets: 50,
      dynamic: 100,
      api: 200,
    }
  }
}

/// Origin endpoints queued mutations are replayed against.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncEndpoints {
  pub scores: String,
  pub timer_events: String,
}

impl Default for SyncEndpoints {
  fn default() -> Self {
    Self {
      scores: "/api/scores/submit".to_string(),
      timer_events: "/api/timer/events".to_string(),
    }
  }
}

/// Version-suffixed names of the three partitions of the active version.
#[derive(Debug, Clone)]
pub struct PartitionNames {
  pub static_assets: String,
  pub dynamic: String,
  pub api: String,
}

impl PartitionNames {
  pub fn for_version(version: &str) -> Self {
    Self {
      static_assets: format!("meetsync-static-{}", version),
      dynamic: format!("meetsync-dynamic-{}", version),
      api: format!("meetsync-api-{}", version),
    }
  }

  /// The expected partition set for this version; anything else is stale.
  pub fn all(&self) -> [&str; 3] {
    [&self.static_assets, &self.dynamic, &self.api]
  }
}

fn default_version() -> String {
  "v1".to_string()
}

fn default_precache() -> Vec<String> {
  vec![
    "/".to_string(),
    "/index.html".to_string(),
    "/app.js".to_string(),
    "/styles.css".to_string(),
    "/offline.html".to_string(),
  ]
}

fn default_request_timeout_secs() -> u64 {
  10
}

impl EngineConfig {
  /// Configuration for the given origin with every default.
  pub fn for_origin(origin: &str) -> Self {
    Self {
      origin: origin.to_string(),
      version: default_version(),
      routes: RoutePolicy::default(),
      limits: PartitionLimits::default(),
      precache: default_precache(),
      sync: SyncEndpoints::default(),
      request_timeout_secs: default_request_timeout_secs(),
    }
  }

  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./meetsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/meetsync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/meetsync/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("meetsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("meetsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: EngineConfig = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  pub fn base_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin URL {}: {}", self.origin, e))
  }

  pub fn partition_names(&self) -> PartitionNames {
    PartitionNames::for_version(&self.version)
  }
}
