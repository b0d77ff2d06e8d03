// src/state/mod.rs

//! Locked, reentrant access to the installed-package registry
//!
//! The registry lives in a single JSON file guarded by an advisory
//! `flock`. The first acquisition in an operation opens the file, takes the
//! lock and parses the document; nested acquisitions reuse that session.
//! When the outermost guard is released the document is written back if it
//! was mutated and differs from what was loaded, or the file is removed if
//! no package remains.
//!
//! # Example
//!
//! ```ignore
//! let store = StateStore::new(env.registry_path());
//! let guard = store.acquire(LockMode::Exclusive)?;
//! store.update(|registry| registry.packages.remove("foo"))?;
//! guard.release()?; // written here, not in update()
//! ```

mod document;

pub use document::{InstalledRecord, Registry, SCHEMA_VERSION};

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// How the registry file is locked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Readers only; mutation is rejected
    Shared,
    /// Single writer across all processes
    Exclusive,
}

/// Owner of the registry file and its in-memory view
pub struct StateStore {
    path: PathBuf,
    session: Mutex<Option<Session>>,
}

struct Session {
    /// Kept open to hold the lock
    file: File,
    mode: LockMode,
    depth: usize,
    loaded: Registry,
    current: Registry,
    dirty: bool,
}

/// Scoped acquisition of the registry
///
/// Dropping the guard releases it; use [`StateGuard::release`] to observe
/// write-back errors.
#[must_use = "the registry is released as soon as the guard is dropped"]
pub struct StateGuard<'a> {
    store: &'a StateStore,
    released: bool,
}

impl StateGuard<'_> {
    /// Release this acquisition, committing if it was the outermost one
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.store.release_one()
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = self.store.release_one()
        {
            warn!("Failed to write back {}: {}", self.store.path.display(), e);
        }
    }
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            session: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the registry, opening and locking it if not already held
    ///
    /// Taking the cross-process lock blocks the calling thread.
    pub fn acquire(&self, mode: LockMode) -> Result<StateGuard<'_>> {
        let mut slot = self.lock_session()?;
        match slot.as_mut() {
            Some(session) => {
                if session.mode == LockMode::Shared && mode == LockMode::Exclusive {
                    return Err(Error::State(
                        "cannot take an exclusive lock inside a shared session".to_string(),
                    ));
                }
                session.depth += 1;
            }
            None => *slot = Some(Session::open(&self.path, mode)?),
        }

        Ok(StateGuard {
            store: self,
            released: false,
        })
    }

    /// Run `f` against the current view
    pub fn read<R>(&self, f: impl FnOnce(&Registry) -> R) -> Result<R> {
        let guard = self.acquire(LockMode::Shared)?;
        let value = {
            let slot = self.lock_session()?;
            let session = slot
                .as_ref()
                .ok_or_else(|| Error::State("registry session vanished".to_string()))?;
            f(&session.current)
        };
        guard.release()?;
        Ok(value)
    }

    /// Run `f` against the mutable view, marking it dirty
    pub fn update<R>(&self, f: impl FnOnce(&mut Registry) -> R) -> Result<R> {
        let guard = self.acquire(LockMode::Exclusive)?;
        let value = {
            let mut slot = self.lock_session()?;
            let session = slot
                .as_mut()
                .ok_or_else(|| Error::State("registry session vanished".to_string()))?;
            if session.mode == LockMode::Shared {
                return Err(Error::State(
                    "registry is locked read-only for this operation".to_string(),
                ));
            }
            session.dirty = true;
            f(&mut session.current)
        };
        guard.release()?;
        Ok(value)
    }

    /// Clone of the current view
    pub fn snapshot(&self) -> Result<Registry> {
        self.read(Registry::clone)
    }

    fn release_one(&self) -> Result<()> {
        let mut slot = self.lock_session()?;
        let Some(session) = slot.as_mut() else {
            return Ok(());
        };

        session.depth -= 1;
        if session.depth > 0 {
            return Ok(());
        }

        match slot.take() {
            Some(session) => session.commit(&self.path),
            None => Ok(()),
        }
    }

    fn lock_session(&self) -> Result<MutexGuard<'_, Option<Session>>> {
        self.session
            .lock()
            .map_err(|_| Error::State("registry session lock poisoned".to_string()))
    }
}

impl Session {
    fn open(path: &Path, mode: LockMode) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // A releasing writer may unlink or replace the file while we wait on
        // the lock; retry until the locked handle is the file at `path`.
        let mut file = loop {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)?;

            match mode {
                LockMode::Exclusive => file.lock_exclusive(),
                LockMode::Shared => file.lock_shared(),
            }
            .map_err(|e| Error::State(format!("failed to lock {}: {e}", path.display())))?;

            if is_current(&file, path)? {
                break file;
            }
            debug!("{} replaced while waiting for lock, reopening", path.display());
        };

        let mut text = String::new();
        file.read_to_string(&mut text)?;
        let loaded = Registry::parse(&text)?;
        debug!(
            "Loaded {} ({} packages, {:?} lock)",
            path.display(),
            loaded.packages.len(),
            mode
        );

        Ok(Self {
            file,
            mode,
            depth: 1,
            current: loaded.clone(),
            loaded,
            dirty: false,
        })
    }

    fn commit(self, path: &Path) -> Result<()> {
        if self.current.is_empty() {
            match fs::remove_file(path) {
                Ok(()) => debug!("Removed empty registry {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        } else if self.dirty && self.current != self.loaded {
            let tmp = path.with_extension("json.tmp");
            let mut out = File::create(&tmp)?;
            out.write_all(self.current.to_json()?.as_bytes())?;
            out.sync_all()?;
            fs::rename(&tmp, path)?;
            debug!("Wrote registry {}", path.display());
        }

        // Closing the handle drops the lock
        drop(self.file);
        Ok(())
    }
}

#[cfg(unix)]
fn is_current(file: &File, path: &Path) -> Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match fs::metadata(path) {
        Ok(on_disk) => Ok(on_disk.dev() == held.dev() && on_disk.ino() == held.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(not(unix))]
fn is_current(_file: &File, path: &Path) -> Result<bool> {
    Ok(path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(sha: &str) -> InstalledRecord {
        InstalledRecord {
            sha: Some(sha.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_file_reads_empty_and_leaves_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("opi/installed.json");
        let store = StateStore::new(&path);

        let registry = store.snapshot().unwrap();
        assert!(registry.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn test_nested_acquisition_defers_write() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("installed.json");
        let store = StateStore::new(&path);

        let outer = store.acquire(LockMode::Exclusive).unwrap();
        let inner = store.acquire(LockMode::Exclusive).unwrap();
        store
            .update(|r| r.packages.insert("foo".to_string(), record("1")))
            .unwrap();
        inner.release().unwrap();
        assert!(!path.exists());

        // Nested reads see the uncommitted view
        assert!(store.read(|r| r.record("foo").is_some()).unwrap());

        outer.release().unwrap();
        let written = Registry::parse(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.record("foo"), Some(&record("1")));
    }

    #[test]
    fn test_unchanged_document_not_rewritten() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("installed.json");
        let compact = r#"{"version":1,"packages":{"foo":{"sha":"1"}}}"#;
        fs::write(&path, compact).unwrap();

        let store = StateStore::new(&path);
        store
            .update(|r| {
                let saved = r.packages.remove("foo");
                r.packages.insert("foo".to_string(), saved.unwrap_or_default());
            })
            .unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), compact);
    }

    #[test]
    fn test_removing_last_package_deletes_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("installed.json");
        let store = StateStore::new(&path);

        store
            .update(|r| r.packages.insert("foo".to_string(), record("1")))
            .unwrap();
        assert!(path.exists());

        store.update(|r| r.packages.remove("foo")).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_schema_mismatch_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("installed.json");
        fs::write(&path, r#"{"version": 7, "packages": {}}"#).unwrap();

        let store = StateStore::new(&path);
        let result = store.acquire(LockMode::Exclusive);
        assert!(matches!(result, Err(Error::SchemaVersion { .. })));
        // The newer document is left untouched
        assert!(fs::read_to_string(&path).unwrap().contains("7"));
    }

    #[test]
    fn test_shared_session_rejects_mutation() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("installed.json");
        let store = StateStore::new(&path);

        let guard = store.acquire(LockMode::Shared).unwrap();
        let result = store.update(|r| r.packages.clear());
        assert!(matches!(result, Err(Error::State(_))));
        guard.release().unwrap();
    }

    #[test]
    fn test_drop_commits_like_release() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("installed.json");
        let store = StateStore::new(&path);

        {
            let _guard = store.acquire(LockMode::Exclusive).unwrap();
            store
                .update(|r| r.packages.insert("bar".to_string(), record("2")))
                .unwrap();
        }

        assert!(path.exists());
    }

    #[test]
    fn test_contending_writers_all_land() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("opi/installed.json");

        std::thread::scope(|scope| {
            for i in 0..8 {
                let path = &path;
                scope.spawn(move || {
                    // Separate stores share nothing but the file lock
                    let store = StateStore::new(path);
                    let guard = store.acquire(LockMode::Exclusive).unwrap();
                    store
                        .update(|r| r.packages.insert(format!("pkg{i}"), record(&i.to_string())))
                        .unwrap();
                    std::thread::sleep(std::time::Duration::from_millis(5));
                    guard.release().unwrap();
                });
            }
        });

        let registry = StateStore::new(&path).snapshot().unwrap();
        assert_eq!(registry.packages.len(), 8);
        for i in 0..8 {
            assert_eq!(
                registry.record(&format!("pkg{i}")).unwrap().sha,
                Some(i.to_string())
            );
        }
    }
}
