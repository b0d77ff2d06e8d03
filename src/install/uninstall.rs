// src/install/uninstall.rs

//! Package removal
//!
//! Removing a package deletes the artifacts its record lists, its source
//! tree and the record itself. A batch is refused up front if any installed
//! package outside the batch still requires one of its members.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::package::PackageRef;
use crate::state::LockMode;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};

/// Outcome of an uninstall batch
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UninstallReport {
    /// Packages that were removed
    pub removed: Vec<String>,
    /// Packages that were requested but not installed
    pub skipped: Vec<String>,
}

/// Remove a batch of packages under one exclusive registry session
pub fn uninstall_all(ctx: &Context, packages: &[PackageRef]) -> Result<UninstallReport> {
    let guard = ctx.store().acquire(LockMode::Exclusive)?;
    let result = remove_batch(ctx, packages);
    let released = guard.release();
    let report = result?;
    released?;
    Ok(report)
}

fn remove_batch(ctx: &Context, packages: &[PackageRef]) -> Result<UninstallReport> {
    if packages.iter().any(|pkg| pkg.is_tool()) {
        return Err(Error::SelfManaged);
    }

    let mut dependents = BTreeSet::new();
    for pkg in packages {
        for dependent in pkg.installed_dependents(ctx)? {
            if !packages.contains(&dependent) {
                dependents.insert(dependent.name().to_string());
            }
        }
    }

    if !dependents.is_empty() {
        return Err(Error::HasDependents {
            packages: packages.iter().map(|p| p.name().to_string()).collect(),
            dependents: dependents.into_iter().collect(),
        });
    }

    let mut report = UninstallReport::default();
    for pkg in packages {
        if uninstall(ctx, pkg, false)? {
            report.removed.push(pkg.name().to_string());
        } else {
            report.skipped.push(pkg.name().to_string());
        }
    }
    Ok(report)
}

/// Remove one package; returns false if it was not installed
///
/// With `keep_source` the package's source tree survives, which is what a
/// reinstall wants after it has already downloaded the new tree.
pub fn uninstall(ctx: &Context, pkg: &PackageRef, keep_source: bool) -> Result<bool> {
    let Some(record) = pkg.installed_record(ctx)? else {
        warn!("Skipping {} as it is not installed", pkg);
        return Ok(false);
    };

    let progress = ctx.progress(&format!("Uninstalling {pkg}"));
    let env = ctx.env();

    for path in record.artifact_paths(&env.bin_dir(), &env.lib_dir()) {
        progress.set_message(&path.display().to_string());
        remove_file_if_present(&path)?;
    }

    if !keep_source {
        remove_dir_if_present(&pkg.source_dir(ctx))?;
    }

    ctx.store().update(|registry| registry.packages.remove(pkg.name()))?;
    progress.finish_with_message("uninstalled");
    info!("Uninstalled {}", pkg);
    Ok(true)
}

fn remove_file_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn remove_dir_if_present(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
