// src/package/registry.rs

//! Identity registry: one `Package` per (name, source) per operation
//!
//! Every reference to a package, whether from the command line, a
//! manifest's `requires` or the installed registry, must go through
//! [`PackageRegistry::get`]. Two handles for one identity would let a
//! diamond dependency be resolved and installed twice.

use super::spec::{self, ParsedSpec};
use super::{Package, PackageRef, SELF_NAME, Source};
use crate::error::{Error, Result};
use crate::state::StateStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Interning map from identity to shared handle
#[derive(Default)]
pub struct PackageRegistry {
    packages: Mutex<HashMap<(String, Source), PackageRef>>,
}

impl PackageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a specifier to the handle for its identity
    ///
    /// A bare name with no origin picks up the origin recorded for that
    /// name in the state store, so `foo` means the installed `foo`.
    pub fn get(&self, specifier: &str, store: &StateStore) -> Result<PackageRef> {
        let ParsedSpec { name, origin } = spec::parse_spec(specifier)?;

        let (name, source) = match (name, origin) {
            (Some(name), None) => {
                let recorded =
                    store.read(|registry| registry.record(&name).and_then(|r| r.origin.clone()))?;
                let source = match recorded {
                    Some(origin) => Source::from_origin(&origin)?,
                    None if name == SELF_NAME => Source::Tool,
                    None => Source::Index,
                };
                (name, source)
            }
            (name, Some(origin)) => {
                let source = Source::from_origin(&origin)?;
                let name = match name {
                    Some(name) => name,
                    None => match &source {
                        Source::Git(url) => spec::infer_name(url)?,
                        Source::Local(path) => spec::infer_name(&path.to_string_lossy())?,
                        Source::Index | Source::Tool => {
                            return Err(Error::InvalidOrigin(origin.clone()));
                        }
                    },
                };
                (name, source)
            }
            (None, None) => return Err(Error::InvalidName(specifier.to_string())),
        };

        if name == SELF_NAME && source != Source::Tool {
            return Err(Error::ReservedName(name));
        }

        self.intern(name, source)
    }

    /// Handle for an identity, creating it on first reference
    pub fn intern(&self, name: String, source: Source) -> Result<PackageRef> {
        let mut packages = self
            .packages
            .lock()
            .map_err(|_| Error::State("package registry lock poisoned".to_string()))?;

        let handle = packages
            .entry((name.clone(), source.clone()))
            .or_insert_with(|| {
                debug!("New package handle {} ({:?})", name, source);
                Arc::new(Package::new(name, source))
            });
        Ok(Arc::clone(handle))
    }

    /// Number of identities referenced so far
    pub fn len(&self) -> usize {
        self.packages.lock().map(|p| p.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InstalledRecord;
    use tempfile::TempDir;

    fn store() -> (TempDir, StateStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = StateStore::new(temp_dir.path().join("installed.json"));
        (temp_dir, store)
    }

    #[test]
    fn test_same_identity_same_handle() {
        let (_dir, store) = store();
        let registry = PackageRegistry::new();

        let a = registry.get("foo_bar", &store).unwrap();
        let b = registry.get("Foo-Bar", &store).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_different_origin_different_identity() {
        let (_dir, store) = store();
        let registry = PackageRegistry::new();

        let index = registry.get("foo", &store).unwrap();
        let git = registry.get("foo@https://example.org/foo.git", &store).unwrap();
        assert!(!Arc::ptr_eq(&index, &git));
        assert_eq!(git.source(), &Source::Git("https://example.org/foo.git".to_string()));
    }

    #[test]
    fn test_bare_name_uses_recorded_origin() {
        let (_dir, store) = store();
        store
            .update(|r| {
                r.packages.insert(
                    "foo".to_string(),
                    InstalledRecord {
                        origin: Some("https://example.org/foo.git".to_string()),
                        ..Default::default()
                    },
                )
            })
            .unwrap();

        let registry = PackageRegistry::new();
        let bare = registry.get("foo", &store).unwrap();
        let explicit = registry.get("https://example.org/foo.git", &store).unwrap();
        assert!(Arc::ptr_eq(&bare, &explicit));
    }

    #[test]
    fn test_reserved_name() {
        let (_dir, store) = store();
        let registry = PackageRegistry::new();

        assert!(registry.get("opi", &store).unwrap().is_tool());
        assert!(matches!(
            registry.get("opi@https://example.org/opi.git", &store),
            Err(Error::ReservedName(_))
        ));
    }

    #[test]
    fn test_bare_origin_infers_name() {
        let (_dir, store) = store();
        let registry = PackageRegistry::new();

        let pkg = registry
            .get("https://github.com/org/my_solver.git", &store)
            .unwrap();
        assert_eq!(pkg.name(), "my-solver");
    }
}
