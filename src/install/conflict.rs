// src/install/conflict.rs

//! Artifact attribution and rollback for a single build
//!
//! Builds drop their output into the shared platform `bin` and `lib`
//! directories, so ownership is inferred: everything that appeared or
//! changed between a snapshot before the build and one after it belongs to
//! the package being built, except files another installed package already
//! claims. Those keep their first owner and are reported.
//!
//! On failure every attributed file is deleted, and a guard dropped without
//! [`ConflictGuard::commit`] or [`ConflictGuard::rollback`] (its build was
//! cancelled) does the same. Files that existed before and were modified in
//! place are not restored; only the attribution is undone.

use crate::config::Environment;
use crate::error::Result;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Modification time of every file under a set of directories
#[derive(Debug, Default, Clone)]
pub struct ArtifactSnapshot {
    files: HashMap<PathBuf, Option<SystemTime>>,
}

impl ArtifactSnapshot {
    /// Walk `dirs`; missing directories contribute nothing
    pub fn take(dirs: &[PathBuf]) -> Result<Self> {
        let mut files = HashMap::new();
        for dir in dirs {
            if !dir.is_dir() {
                continue;
            }
            for entry in WalkDir::new(dir).follow_links(false) {
                let entry = entry.map_err(io::Error::other)?;
                if entry.file_type().is_dir() {
                    continue;
                }
                let modified = entry.metadata().ok().and_then(|m| m.modified().ok());
                files.insert(entry.into_path(), modified);
            }
        }
        Ok(Self { files })
    }

    /// Files that are new in `self` or whose mtime differs from `before`
    pub fn changed_since(&self, before: &ArtifactSnapshot) -> BTreeSet<PathBuf> {
        self.files
            .iter()
            .filter(|(path, modified)| before.files.get(*path) != Some(*modified))
            .map(|(path, _)| path.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Artifacts attributed to one package, relative to `bin`/`lib`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifacts {
    pub apps: Vec<String>,
    pub libs: Vec<String>,
}

/// Tracks what one build produces
pub struct ConflictGuard {
    package: String,
    bin_dir: PathBuf,
    lib_dir: PathBuf,
    before: ArtifactSnapshot,
    /// Artifacts recorded by other installed packages
    claimed: HashSet<PathBuf>,
    settled: bool,
}

impl ConflictGuard {
    /// Snapshot the output directories before building `package`
    pub fn begin(package: &str, env: &Environment, claimed: impl IntoIterator<Item = PathBuf>) -> Result<Self> {
        let bin_dir = env.bin_dir();
        let lib_dir = env.lib_dir();
        let before = ArtifactSnapshot::take(&[bin_dir.clone(), lib_dir.clone()])?;
        debug!("{}: {} existing output file(s) before build", package, before.len());

        Ok(Self {
            package: package.to_string(),
            bin_dir,
            lib_dir,
            before,
            claimed: claimed.into_iter().collect(),
            settled: false,
        })
    }

    /// Files produced by this build that no other package owns
    pub fn attributed(&self) -> Result<BTreeSet<PathBuf>> {
        let after = ArtifactSnapshot::take(&[self.bin_dir.clone(), self.lib_dir.clone()])?;
        let mut changed = after.changed_since(&self.before);

        changed.retain(|path| {
            if self.claimed.contains(path) {
                warn!(
                    "{} modified {}, which was installed by another package!",
                    self.package,
                    path.display()
                );
                false
            } else {
                true
            }
        });
        Ok(changed)
    }

    /// Classify this build's artifacts after a successful build
    pub fn commit(mut self) -> Result<Artifacts> {
        self.settled = true;
        let mut artifacts = Artifacts::default();
        for path in self.attributed()? {
            if let Some(app) = relative(&path, &self.bin_dir) {
                artifacts.apps.push(app);
            } else if let Some(lib) = relative(&path, &self.lib_dir) {
                artifacts.libs.push(lib);
            }
        }
        artifacts.apps.sort();
        artifacts.libs.sort();
        Ok(artifacts)
    }

    /// Delete everything this build produced; returns the removed paths
    pub fn rollback(mut self) -> Result<Vec<PathBuf>> {
        self.settled = true;
        self.remove_attributed()
    }

    fn remove_attributed(&self) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for path in self.attributed()? {
            match fs::remove_file(&path) {
                Ok(()) => removed.push(path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        debug!("{}: rolled back {} file(s)", self.package, removed.len());
        Ok(removed)
    }
}

impl Drop for ConflictGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        match self.remove_attributed() {
            Ok(removed) if !removed.is_empty() => warn!(
                "{}: build interrupted, removed {} file(s) it produced",
                self.package,
                removed.len()
            ),
            Ok(_) => {}
            Err(e) => warn!("{}: failed to clean up interrupted build: {}", self.package, e),
        }
    }
}

fn relative(path: &Path, base: &Path) -> Option<String> {
    path.strip_prefix(base)
        .ok()
        .map(|rel| rel.to_string_lossy().replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env() -> (TempDir, Environment) {
        let temp_dir = TempDir::new().unwrap();
        let env = Environment::new(temp_dir.path(), 2406);
        fs::create_dir_all(env.bin_dir()).unwrap();
        fs::create_dir_all(env.lib_dir()).unwrap();
        (temp_dir, env)
    }

    #[test]
    fn test_new_files_are_attributed() {
        let (_dir, env) = env();
        fs::write(env.bin_dir().join("preexisting"), "x").unwrap();

        let guard = ConflictGuard::begin("foo", &env, Vec::new()).unwrap();
        fs::write(env.bin_dir().join("fooSolver"), "bin").unwrap();
        fs::create_dir_all(env.lib_dir().join("sub")).unwrap();
        fs::write(env.lib_dir().join("sub/libfoo.so"), "lib").unwrap();

        let artifacts = guard.commit().unwrap();
        assert_eq!(artifacts.apps, vec!["fooSolver"]);
        assert_eq!(artifacts.libs, vec!["sub/libfoo.so"]);
    }

    #[test]
    fn test_claimed_files_keep_first_owner() {
        let (_dir, env) = env();
        let tool = env.bin_dir().join("tool");

        let guard = ConflictGuard::begin("second", &env, vec![tool.clone()]).unwrap();
        fs::write(&tool, "overwritten").unwrap();
        fs::write(env.bin_dir().join("own"), "x").unwrap();

        let artifacts = guard.commit().unwrap();
        assert_eq!(artifacts.apps, vec!["own"]);
    }

    #[test]
    fn test_rollback_removes_only_attributed() {
        let (_dir, env) = env();
        let other = env.lib_dir().join("libother.so");
        fs::write(&other, "x").unwrap();

        let guard = ConflictGuard::begin("foo", &env, vec![other.clone()]).unwrap();
        fs::write(env.bin_dir().join("partial"), "x").unwrap();

        let removed = guard.rollback().unwrap();
        assert_eq!(removed, vec![env.bin_dir().join("partial")]);
        assert!(other.exists());
        assert!(!env.bin_dir().join("partial").exists());
    }

    #[test]
    fn test_unsettled_guard_rolls_back_on_drop() {
        let (_dir, env) = env();
        let guard = ConflictGuard::begin("foo", &env, Vec::new()).unwrap();
        fs::write(env.bin_dir().join("halfBuilt"), "x").unwrap();

        drop(guard);
        assert!(!env.bin_dir().join("halfBuilt").exists());
    }

    #[test]
    fn test_committed_guard_keeps_artifacts_on_drop() {
        let (_dir, env) = env();
        let guard = ConflictGuard::begin("foo", &env, Vec::new()).unwrap();
        fs::write(env.bin_dir().join("fooSolver"), "x").unwrap();

        guard.commit().unwrap();
        assert!(env.bin_dir().join("fooSolver").exists());
    }

    #[test]
    fn test_missing_output_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let env = Environment::new(temp_dir.path(), 11);
        let snapshot = ArtifactSnapshot::take(&[env.bin_dir(), env.lib_dir()]).unwrap();
        assert!(snapshot.is_empty());
    }
}
