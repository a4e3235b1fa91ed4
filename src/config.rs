//! Engine configuration
//!
//! Stored in ~/.tasksync/config.json. Every field has a default, so a missing
//! or partial file never blocks startup — the engine runs on defaults and
//! logs what it loaded.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Reference collections (users, brands, companies, task types): 5 minutes.
const DEFAULT_REFERENCE_TTL_SECS: u64 = 300;
/// Per-(company, user) assignment mappings: 60 seconds.
const DEFAULT_MAPPING_TTL_SECS: u64 = 60;
/// Bulk task refresh throttle: 60 seconds.
const DEFAULT_TASKS_TTL_SECS: u64 = 60;
/// Companies whose assignees may edit their own tasks.
const DEFAULT_ASSIGNEE_EDIT_COMPANIES: &[&str] = &["Speed E Com"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Directory for per-actor persisted state (seen-sets).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_reference_ttl_secs")]
    pub reference_ttl_secs: u64,
    #[serde(default = "default_mapping_ttl_secs")]
    pub mapping_ttl_secs: u64,
    #[serde(default = "default_tasks_ttl_secs")]
    pub tasks_ttl_secs: u64,
    /// Companies whose assignees may edit their own tasks in addition to the
    /// assigner. Matched case-insensitively.
    #[serde(default = "default_assignee_edit_companies")]
    pub assignee_edit_companies: Vec<String>,
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".tasksync")
}

fn default_reference_ttl_secs() -> u64 {
    DEFAULT_REFERENCE_TTL_SECS
}

fn default_mapping_ttl_secs() -> u64 {
    DEFAULT_MAPPING_TTL_SECS
}

fn default_tasks_ttl_secs() -> u64 {
    DEFAULT_TASKS_TTL_SECS
}

fn default_assignee_edit_companies() -> Vec<String> {
    DEFAULT_ASSIGNEE_EDIT_COMPANIES
        .iter()
        .map(|name| name.to_string())
        .collect()
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            data_dir: default_data_dir(),
            reference_ttl_secs: DEFAULT_REFERENCE_TTL_SECS,
            mapping_ttl_secs: DEFAULT_MAPPING_TTL_SECS,
            tasks_ttl_secs: DEFAULT_TASKS_TTL_SECS,
            assignee_edit_companies: default_assignee_edit_companies(),
        }
    }
}

impl EngineConfig {
    pub fn reference_ttl(&self) -> Duration {
        Duration::from_secs(self.reference_ttl_secs)
    }

    pub fn mapping_ttl(&self) -> Duration {
        Duration::from_secs(self.mapping_ttl_secs)
    }

    pub fn tasks_ttl(&self) -> Duration {
        Duration::from_secs(self.tasks_ttl_secs)
    }
}

/// Path to the config file (~/.tasksync/config.json).
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".tasksync").join("config.json"))
}

/// Load configuration, falling back to defaults on any miss or parse error.
pub fn load_or_default() -> EngineConfig {
    let Some(path) = config_path() else {
        log::warn!("Config: no home directory, using defaults");
        return EngineConfig::default();
    };
    match std::fs::read_to_string(&path) {
        Ok(content) => match serde_json::from_str::<EngineConfig>(&content) {
            Ok(config) => {
                log::info!("Config: loaded from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Config: parse error in {} ({}), using defaults", path.display(), e);
                EngineConfig::default()
            }
        },
        Err(_) => {
            log::info!("Config: no file at {}, using defaults", path.display());
            EngineConfig::default()
        }
    }
}
