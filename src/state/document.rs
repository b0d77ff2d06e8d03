// src/state/document.rs

//! The persisted registry document (`installed.json`)

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Schema version this build reads and writes
pub const SCHEMA_VERSION: u32 = 1;

/// Installed packages keyed by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    pub version: u32,
    #[serde(default)]
    pub packages: BTreeMap<String, InstalledRecord>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            packages: BTreeMap::new(),
        }
    }
}

/// What was recorded when a package was installed
///
/// Absent keys mean "not applicable"; index-hosted packages carry no origin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,
    /// Application paths relative to the platform `bin` directory
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub apps: Vec<String>,
    /// Library paths relative to the platform `lib` directory
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libs: Vec<String>,
}

impl InstalledRecord {
    /// Absolute paths of every artifact this record claims
    pub fn artifact_paths(&self, bin_dir: &Path, lib_dir: &Path) -> Vec<PathBuf> {
        self.apps
            .iter()
            .map(|app| bin_dir.join(app))
            .chain(self.libs.iter().map(|lib| lib_dir.join(lib)))
            .collect()
    }
}

impl Registry {
    /// Parse document text
    ///
    /// Empty or unparsable text yields an empty registry. A well-formed
    /// document with a different schema version is fatal.
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }

        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                warn!("Ignoring unreadable installed.json: {}", e);
                return Ok(Self::default());
            }
        };

        if value.as_object().is_some_and(|obj| obj.is_empty()) {
            return Ok(Self::default());
        }

        match value.get("version") {
            Some(version) if version.as_u64() == Some(u64::from(SCHEMA_VERSION)) => {}
            other => {
                return Err(Error::SchemaVersion {
                    found: other.map_or_else(|| "none".to_string(), |v| v.to_string()),
                    expected: SCHEMA_VERSION,
                });
            }
        }

        serde_json::from_value(value)
            .map_err(|e| Error::State(format!("malformed installed.json: {e}")))
    }

    /// Serialize for writing
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// True when no package is recorded
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn record(&self, name: &str) -> Option<&InstalledRecord> {
        self.packages.get(name)
    }

    /// Names of installed packages that declared `name` as a requirement
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.packages
            .iter()
            .filter(|(_, record)| record.requires.iter().any(|req| req == name))
            .map(|(dependent, _)| dependent.clone())
            .collect()
    }

    /// Every artifact claimed by any installed package
    pub fn claimed_artifacts(&self, bin_dir: &Path, lib_dir: &Path) -> Vec<PathBuf> {
        self.packages
            .values()
            .flat_map(|record| record.artifact_paths(bin_dir, lib_dir))
            .collect()
    }
}
