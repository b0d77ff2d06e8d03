// src/package/manifest.rs

//! Package manifest (`metadata.json`)

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// The only named build system
pub const WMAKE: &str = "wmake";

/// Steps `wmake` expands to
const WMAKE_STEPS: &[&str] = &["wmake all -j"];

/// Build description: a named system or explicit shell commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BuildSpec {
    System(String),
    Steps(Vec<String>),
}

impl Default for BuildSpec {
    fn default() -> Self {
        BuildSpec::System(WMAKE.to_string())
    }
}

/// Metadata describing how to build a package and what it needs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Names of packages required to build this one
    #[serde(default)]
    pub requires: Vec<String>,
    /// Version specifiers against the host toolchain
    #[serde(default)]
    pub version: Vec<String>,
    #[serde(default)]
    pub build: BuildSpec,
    /// Upstream repository (index-hosted packages only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
}

impl Manifest {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Shell commands to run, in order
    pub fn build_steps(&self, package: &str) -> Result<Vec<String>> {
        match &self.build {
            BuildSpec::System(name) if name == WMAKE => {
                Ok(WMAKE_STEPS.iter().map(|s| s.to_string()).collect())
            }
            BuildSpec::System(name) => Err(Error::UnsupportedBuildSystem {
                package: package.to_string(),
                build: name.clone(),
            }),
            BuildSpec::Steps(steps) => Ok(steps.clone()),
        }
    }
}
