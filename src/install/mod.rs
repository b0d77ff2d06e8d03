// src/install/mod.rs

//! Installation scheduling
//!
//! `install_all` resolves what needs building, rejects conflicting names
//! and dependency cycles, then starts one task per resolved package. Tasks
//! fetch and download concurrently; each one waits for the packages it
//! requires to finish before building, and builds themselves run one at a
//! time under the context's build lock.
//!
//! Every resolved package owns a completion signal. A task that finishes
//! flips it; a task that fails drops it along with the rest of the batch,
//! which wakes any waiter with [`Error::DependencyAborted`] instead of
//! leaving it hanging.
//!
//! # Build sequence for one package
//!
//! 1. Fetch the manifest and materialize the source tree
//! 2. Remove any installed package with the same name (keeping the new tree)
//! 3. Wait for required packages in this batch
//! 4. Under the build lock: snapshot outputs, run each build step
//! 5. Record the attributed artifacts, or roll them back on failure

mod conflict;
mod uninstall;

pub use conflict::{ArtifactSnapshot, Artifacts, ConflictGuard};
pub use uninstall::{UninstallReport, uninstall, uninstall_all};

use crate::config::DEPENDENCIES_VAR;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::package::{Manifest, PackageRef};
use crate::resolver::{CycleDetector, DependencyResolver, PackageSet, check_duplicate_names};
use crate::state::{InstalledRecord, LockMode};
use futures::future::try_join_all;
use std::collections::HashMap;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// A package built by an install batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub name: String,
    pub apps: Vec<String>,
    pub libs: Vec<String>,
}

/// Outcome of an install batch
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Packages built, ordered by name
    pub installed: Vec<InstalledPackage>,
    /// Requested packages that needed no work
    pub satisfied: Vec<String>,
}

impl InstallReport {
    pub fn is_noop(&self) -> bool {
        self.installed.is_empty()
    }
}

type Signals = HashMap<PackageRef, watch::Sender<bool>>;

/// Drives one install batch
pub struct InstallScheduler<'a> {
    ctx: &'a Context,
}

impl<'a> InstallScheduler<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    /// Install `requested` and whatever they pull in
    ///
    /// With `upgrade`, installed packages are rebuilt when upstream moved.
    /// The registry stays exclusively locked for the whole batch and is
    /// written back once at the end.
    pub async fn install_all(&self, requested: &[PackageRef], upgrade: bool) -> Result<InstallReport> {
        let guard = self.ctx.store().acquire(LockMode::Exclusive)?;
        let result = self.run(requested, upgrade).await;
        let released = guard.release();
        let report = result?;
        released?;
        Ok(report)
    }

    async fn run(&self, requested: &[PackageRef], upgrade: bool) -> Result<InstallReport> {
        let ctx = self.ctx;
        let resolved = DependencyResolver::new(ctx)
            .resolve_all(requested, upgrade)
            .await?;

        let satisfied: Vec<&PackageRef> = requested
            .iter()
            .filter(|pkg| !resolved.contains(*pkg))
            .collect();

        check_duplicate_names(resolved.iter().chain(satisfied.iter().copied()))?;
        CycleDetector::from_resolved(ctx, &resolved)?.check()?;

        let mut report = InstallReport {
            satisfied: satisfied.iter().map(|p| p.name().to_string()).collect(),
            ..Default::default()
        };
        for pkg in &satisfied {
            info!("{} is already installed", pkg);
        }

        if resolved.is_empty() {
            return Ok(report);
        }

        let signals: Signals = resolved
            .iter()
            .map(|pkg| (PackageRef::clone(pkg), watch::channel(false).0))
            .collect();

        let tasks = resolved
            .iter()
            .map(|pkg| self.install_one(pkg, &resolved, &signals));
        report.installed = try_join_all(tasks).await?;
        Ok(report)
    }

    async fn install_one(
        &self,
        pkg: &PackageRef,
        resolved: &PackageSet,
        signals: &Signals,
    ) -> Result<InstalledPackage> {
        let ctx = self.ctx;
        let manifest = pkg.ensure_fetched(ctx).await?;
        let revision = pkg.download(ctx).await?;

        // Whatever holds this name now is replaced, even under another origin
        let previous = ctx.package(pkg.name())?;
        if previous.is_installed(ctx)? {
            debug!("Replacing installed {}", previous);
            uninstall(ctx, &previous, true)?;
        }

        self.wait_for_dependencies(pkg, resolved, signals).await?;

        let installed = {
            let _permit = ctx.build_permit().await;
            self.build(pkg, manifest, revision).await?
        };

        pkg.clear_upgrade();
        if let Some(signal) = signals.get(pkg) {
            signal.send_replace(true);
        }
        info!("Installed {}", pkg);
        Ok(installed)
    }

    async fn wait_for_dependencies(
        &self,
        pkg: &PackageRef,
        resolved: &PackageSet,
        signals: &Signals,
    ) -> Result<()> {
        let waits = pkg
            .requested_dependencies(self.ctx)?
            .into_iter()
            .filter(|dep| resolved.contains(dep))
            .filter_map(|dep| {
                let receiver = signals.get(&dep)?.subscribe();
                Some(wait_done(dep, receiver))
            });

        try_join_all(waits).await?;
        Ok(())
    }

    /// Run the build steps; caller holds the build permit
    async fn build(
        &self,
        pkg: &PackageRef,
        manifest: &Manifest,
        revision: Option<String>,
    ) -> Result<InstalledPackage> {
        let ctx = self.ctx;
        let env = ctx.env();
        let steps = manifest.build_steps(pkg.name())?;
        let workdir = pkg.source_dir(ctx);

        let mut build_env = Vec::new();
        if !manifest.requires.is_empty() {
            build_env.push((
                DEPENDENCIES_VAR.to_string(),
                env.packages_dir().to_string_lossy().into_owned(),
            ));
        }

        let claimed = ctx.store().read(|registry| {
            let mut others = registry.clone();
            others.packages.remove(pkg.name());
            others.claimed_artifacts(&env.bin_dir(), &env.lib_dir())
        })?;
        let guard = ConflictGuard::begin(pkg.name(), env, claimed)?;

        let progress = ctx.progress(&format!("Installing {pkg}"));
        let mut outcome = Ok(());
        for step in &steps {
            debug!("{}: running {}", pkg.name(), step);
            outcome = ctx
                .runner()
                .run_step(pkg.name(), step, &workdir, &build_env, progress.as_ref())
                .await;
            if outcome.is_err() {
                break;
            }
        }

        if let Err(e) = outcome {
            progress.finish_with_error(&e.to_string());
            // Cleanup problems are logged; the build error is what gets reported
            match guard.rollback() {
                Ok(removed) if !removed.is_empty() => {
                    warn!("Removed {} file(s) left by failed build of {}", removed.len(), pkg)
                }
                Ok(_) => {}
                Err(cleanup) => warn!("Failed to roll back build of {}: {}", pkg, cleanup),
            }
            if let Err(cleanup) = uninstall::remove_dir_if_present(&workdir) {
                warn!("Failed to remove {}: {}", workdir.display(), cleanup);
            }
            return Err(e);
        }

        let artifacts = guard.commit()?;
        progress.finish_with_message("installed");

        let mut requires: Vec<String> = pkg
            .requested_dependencies(ctx)?
            .iter()
            .map(|dep| dep.name().to_string())
            .collect();
        requires.sort();
        requires.dedup();

        let record = InstalledRecord {
            sha: revision,
            origin: pkg.source().persisted_origin(),
            requires,
            apps: artifacts.apps.clone(),
            libs: artifacts.libs.clone(),
        };
        ctx.store()
            .update(|registry| registry.packages.insert(pkg.name().to_string(), record))?;

        Ok(InstalledPackage {
            name: pkg.name().to_string(),
            apps: artifacts.apps,
            libs: artifacts.libs,
        })
    }
}

async fn wait_done(dep: PackageRef, mut receiver: watch::Receiver<bool>) -> Result<()> {
    receiver
        .wait_for(|done| *done)
        .await
        .map(|_| ())
        .map_err(|_| Error::DependencyAborted(dep.name().to_string()))
}
