// src/config.rs

//! Host environment discovery and tool settings
//!
//! The host toolchain is described entirely by environment variables set
//! when an OpenFOAM installation is sourced. Everything opi writes lives
//! under the user platform directory those variables point at.

use crate::error::{Error, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Default base URL of the package metadata index
pub const DEFAULT_INDEX_URL: &str = "https://raw.githubusercontent.com/exasim-project/opi/main/pkg";

/// Environment variable handed to builds of packages with requirements
pub const DEPENDENCIES_VAR: &str = "OPI_DEPENDENCIES";

/// The host toolchain as seen by this process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    platform: PathBuf,
    version: u32,
}

impl Environment {
    /// Create an environment rooted at an explicit platform directory
    pub fn new(platform: impl Into<PathBuf>, version: u32) -> Self {
        Self {
            platform: platform.into(),
            version,
        }
    }

    /// Discover the environment from `FOAM_USER_APPBIN`, `FOAM_USER_LIBBIN`
    /// and `WM_PROJECT_VERSION`
    pub fn from_env() -> Result<Self> {
        let app = env::var_os("FOAM_USER_APPBIN")
            .map(PathBuf::from)
            .ok_or_else(|| Error::Environment("FOAM_USER_APPBIN is not set".to_string()))?;
        let lib = env::var_os("FOAM_USER_LIBBIN")
            .map(PathBuf::from)
            .ok_or_else(|| Error::Environment("FOAM_USER_LIBBIN is not set".to_string()))?;
        let version = env::var("WM_PROJECT_VERSION")
            .map_err(|_| Error::Environment("WM_PROJECT_VERSION is not set".to_string()))?;

        let platform = platform_from_dirs(&app, &lib)?;
        let version = parse_version(&version)?;

        Ok(Self { platform, version })
    }

    /// User platform directory (parent of `bin` and `lib`)
    pub fn platform(&self) -> &Path {
        &self.platform
    }

    /// Integer toolchain version (e.g. 11 or 2312)
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Directory receiving built applications
    pub fn bin_dir(&self) -> PathBuf {
        self.platform.join("bin")
    }

    /// Directory receiving built libraries
    pub fn lib_dir(&self) -> PathBuf {
        self.platform.join("lib")
    }

    /// Directory holding opi's own state
    pub fn state_dir(&self) -> PathBuf {
        self.platform.join("opi")
    }

    /// Path of the persisted package registry
    pub fn registry_path(&self) -> PathBuf {
        self.state_dir().join("installed.json")
    }

    /// Root directory containing every package source tree
    pub fn packages_dir(&self) -> PathBuf {
        self.state_dir().join("pkg")
    }

    /// Source tree of a single package
    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.packages_dir().join(name)
    }
}

fn platform_from_dirs(app: &Path, lib: &Path) -> Result<PathBuf> {
    let platform = app
        .parent()
        .ok_or_else(|| Error::Environment(format!("invalid FOAM_USER_APPBIN: {}", app.display())))?;

    if app != platform.join("bin") || lib != platform.join("lib") {
        return Err(Error::Environment(format!(
            "FOAM_USER_APPBIN ({}) and FOAM_USER_LIBBIN ({}) must be bin/ and lib/ of one directory",
            app.display(),
            lib.display()
        )));
    }

    Ok(platform.to_path_buf())
}

/// Parse `WM_PROJECT_VERSION`, accepting the `vYYMM` form
pub fn parse_version(raw: &str) -> Result<u32> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix('v').unwrap_or(trimmed);
    digits
        .parse()
        .map_err(|_| Error::Environment(format!("unrecognized WM_PROJECT_VERSION '{raw}'")))
}

/// Tool settings that are not part of the host environment
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL under which `<name>/metadata.json` is served
    pub index_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            index_url: DEFAULT_INDEX_URL.to_string(),
        }
    }
}

impl Settings {
    /// Load settings, honouring `OPI_INDEX_URL`
    pub fn from_env() -> Self {
        match env::var("OPI_INDEX_URL") {
            Ok(url) if !url.trim().is_empty() => Self {
                index_url: url.trim().trim_end_matches('/').to_string(),
            },
            _ => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_forms() {
        assert_eq!(parse_version("11").unwrap(), 11);
        assert_eq!(parse_version("v2312").unwrap(), 2312);
        assert!(matches!(parse_version("dev"), Err(Error::Environment(_))));
    }

    #[test]
    fn test_platform_from_dirs() {
        let platform = platform_from_dirs(
            Path::new("/home/u/OpenFOAM/platforms/linux64/bin"),
            Path::new("/home/u/OpenFOAM/platforms/linux64/lib"),
        )
        .unwrap();
        assert_eq!(platform, PathBuf::from("/home/u/OpenFOAM/platforms/linux64"));

        let mismatched = platform_from_dirs(Path::new("/a/bin"), Path::new("/b/lib"));
        assert!(matches!(mismatched, Err(Error::Environment(_))));
    }

    #[test]
    fn test_derived_paths() {
        let env = Environment::new("/p", 2406);
        assert_eq!(env.bin_dir(), PathBuf::from("/p/bin"));
        assert_eq!(env.lib_dir(), PathBuf::from("/p/lib"));
        assert_eq!(env.registry_path(), PathBuf::from("/p/opi/installed.json"));
        assert_eq!(env.package_dir("foo"), PathBuf::from("/p/opi/pkg/foo"));
    }
}
