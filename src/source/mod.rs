// src/source/mod.rs

//! Retrieval of package metadata and source trees
//!
//! [`SourceProvider`] is the seam between package resolution and the
//! mechanics of getting bytes: the metadata index over HTTP, version
//! control checkouts, and local directory copies. Resolution only ever
//! talks to the trait, so tests substitute an in-memory provider.

mod git;

pub use git::GitSourceProvider;

use crate::error::Result;
use crate::package::Manifest;
use async_trait::async_trait;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// File name of a package manifest inside a source tree
pub const MANIFEST_FILE: &str = "metadata.json";

/// Trait for fetching package metadata and sources
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Fetch the index entry for an index-hosted package
    async fn index_manifest(&self, name: &str) -> Result<Manifest>;

    /// Refresh `checkout` from `repo` without touching its working tree
    ///
    /// Returns the upstream head revision, or `None` when there is no
    /// checkout yet.
    async fn remote_revision(&self, repo: &str, checkout: &Path) -> Result<Option<String>>;

    /// Clone `repo` into `checkout`, or move an existing checkout to the
    /// upstream head. Returns the checked-out revision.
    async fn checkout(&self, repo: &str, checkout: &Path) -> Result<String>;

    /// Read the manifest of `checkout` as of `revision`; `None` if the
    /// package ships none
    async fn manifest_at(&self, checkout: &Path, revision: &str) -> Result<Option<Manifest>>;

    /// Read the manifest of a local source directory
    async fn local_manifest(&self, dir: &Path) -> Result<Option<Manifest>> {
        match tokio::fs::read_to_string(dir.join(MANIFEST_FILE)).await {
            Ok(text) => Ok(Some(Manifest::from_json(&text)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace `dest` with a fresh copy of the local directory `src`
    async fn copy_local(&self, src: &Path, dest: &Path) -> Result<()> {
        copy_tree(src, dest)
    }
}

/// Recursively copy `src` to `dest`, removing whatever was at `dest`
pub fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    match fs::remove_dir_all(dest) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    fs::create_dir_all(dest)?;

    for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }

    debug!("Copied {} to {}", src.display(), dest.display());
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(link)?, target)
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> io::Result<()> {
    fs::copy(link, target).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_tree_replaces_destination() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        let dest = temp_dir.path().join("dest");

        fs::create_dir_all(src.join("Make")).unwrap();
        fs::write(src.join("Make/files"), "solver.C").unwrap();
        fs::write(src.join(MANIFEST_FILE), "{}").unwrap();

        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("stale.o"), "old").unwrap();

        copy_tree(&src, &dest).unwrap();

        assert_eq!(fs::read_to_string(dest.join("Make/files")).unwrap(), "solver.C");
        assert!(dest.join(MANIFEST_FILE).exists());
        assert!(!dest.join("stale.o").exists());
    }
}
