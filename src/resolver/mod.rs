// src/resolver/mod.rs

//! Dependency resolution
//!
//! Computes the set of packages an install must (re)build. The walk goes
//! two ways from every package that needs work:
//!
//! - down into its requested dependencies, with `upgrade` set, so missing
//!   or outdated requirements are pulled in;
//! - up into its installed dependents, with `force_reinstall` set, since
//!   anything built against a changed package must be rebuilt.
//!
//! A visited set shared by the whole walk stops cycles and keeps diamond
//! dependencies from being resolved twice. Sibling branches are resolved
//! concurrently and the first error fails the whole walk.

pub mod cycle;

pub use cycle::CycleDetector;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::package::PackageRef;
use futures::future::{BoxFuture, FutureExt, try_join_all};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Mutex;
use tracing::debug;

/// Ordered set of package handles
pub type PackageSet = BTreeSet<PackageRef>;

/// Fail if two different identities share a name
pub fn check_duplicate_names<'p>(packages: impl IntoIterator<Item = &'p PackageRef>) -> Result<()> {
    let mut by_name: BTreeMap<&str, HashSet<&PackageRef>> = BTreeMap::new();
    for pkg in packages {
        by_name.entry(pkg.name()).or_default().insert(pkg);
    }

    let duplicates: Vec<String> = by_name
        .into_iter()
        .filter(|(_, identities)| identities.len() > 1)
        .map(|(name, _)| name.to_string())
        .collect();

    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(Error::DuplicateNames(duplicates))
    }
}

/// One resolution walk; build a new resolver per top-level operation
pub struct DependencyResolver<'a> {
    ctx: &'a Context,
    visited: Mutex<HashSet<PackageRef>>,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self {
            ctx,
            visited: Mutex::new(HashSet::new()),
        }
    }

    /// Resolve every requested package, sharing one visited set
    pub async fn resolve_all(&self, requested: &[PackageRef], upgrade: bool) -> Result<PackageSet> {
        check_duplicate_names(requested)?;

        // Self-update is not something opi does
        if upgrade && requested.iter().any(|pkg| pkg.is_tool()) {
            return Err(Error::SelfManaged);
        }

        let branches = requested
            .iter()
            .map(|pkg| self.resolve(PackageRef::clone(pkg), upgrade, false));

        let mut resolved = PackageSet::new();
        for set in try_join_all(branches).await? {
            resolved.extend(set);
        }

        debug!(
            "Resolved {} package(s): {}",
            resolved.len(),
            resolved.iter().map(|p| p.name()).collect::<Vec<_>>().join(", ")
        );
        Ok(resolved)
    }

    /// Packages that must be installed for `pkg`
    pub fn resolve(
        &self,
        pkg: PackageRef,
        upgrade: bool,
        force_reinstall: bool,
    ) -> BoxFuture<'_, Result<PackageSet>> {
        async move {
            if !self.first_visit(&pkg)? {
                return Ok(PackageSet::new());
            }

            // opi is always present and never rebuilt
            if pkg.is_tool() {
                return Ok(PackageSet::new());
            }

            let ctx = self.ctx;
            if pkg.is_installed(ctx)? && !upgrade && !force_reinstall {
                return Ok(PackageSet::new());
            }

            pkg.ensure_fetched(ctx).await?;

            if pkg.is_installed(ctx)? && !pkg.upgrade_available() && !force_reinstall {
                debug!("{} is up to date", pkg);
                return Ok(PackageSet::new());
            }

            let dependencies = pkg.requested_dependencies(ctx)?;
            let dependents = pkg.installed_dependents(ctx)?;
            debug!(
                "{} needs install ({} requirement(s), {} dependent(s))",
                pkg,
                dependencies.len(),
                dependents.len()
            );

            let branches = dependencies
                .into_iter()
                .map(|dep| self.resolve(dep, true, false))
                .chain(
                    dependents
                        .into_iter()
                        .map(|dependent| self.resolve(dependent, false, true)),
                );

            let mut resolved = PackageSet::from([pkg]);
            for set in try_join_all(branches).await? {
                resolved.extend(set);
            }
            Ok(resolved)
        }
        .boxed()
    }

    fn first_visit(&self, pkg: &PackageRef) -> Result<bool> {
        let mut visited = self
            .visited
            .lock()
            .map_err(|_| Error::State("resolver visited set poisoned".to_string()))?;
        Ok(visited.insert(PackageRef::clone(pkg)))
    }
}
