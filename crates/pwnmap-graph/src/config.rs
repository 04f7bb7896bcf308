//! Analysis configuration.
//!
//! Stored as JSON in `.pwnmap/config.json`; every field has a default so
//! partial files are accepted.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Directory holding the configuration, relative to the working directory.
pub const CONFIG_DIR: &str = ".pwnmap";
pub const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_QUERY: &str =
    "(&(objectClass=group)(|(name=Domain Admins)(name=Enterprise Admins)))";

/// Whether to add placeholder objects for well-known principals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnownSidPolicy {
    /// Add the principal unless an object with its SID was loaded.
    #[default]
    IfMissing,
    Never,
}

/// Which object the SID index points at when two objects share a SID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SidCollisionPolicy {
    #[default]
    KeepFirst,
    KeepLast,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Keep every attribute from the cache instead of the analysis set.
    pub import_all: bool,
    pub known_sids: KnownSidPolicy,
    pub sid_collisions: SidCollisionPolicy,
    /// Run per-object passes on the rayon thread pool.
    pub parallel: bool,
    /// Filter selecting the seed objects for an export.
    pub default_query: String,
    pub max_depth: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            import_all: false,
            known_sids: KnownSidPolicy::default(),
            sid_collisions: SidCollisionPolicy::default(),
            parallel: true,
            default_query: DEFAULT_QUERY.to_string(),
            max_depth: 99,
        }
    }
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
