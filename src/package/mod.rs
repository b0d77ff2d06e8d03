// src/package/mod.rs

//! Packages and their identities
//!
//! A package is identified by its name together with where it comes from
//! ([`Source`]). The [`PackageRegistry`] hands out exactly one shared
//! [`Package`] per identity for an operation, so set membership and
//! equality between handles are meaningful.
//!
//! Retrieval differs per source kind and is dispatched with a `match` on
//! [`Source`]:
//!
//! | Source | Manifest | Revision | Download |
//! |---|---|---|---|
//! | `Index` | index entry | upstream head of `repo` | git checkout |
//! | `Git` | `metadata.json` at upstream head | upstream head | git checkout |
//! | `Local` | `metadata.json` in the directory | none (always upgradable) | copy |
//! | `Tool` | never fetched | n/a | n/a |

mod manifest;
pub mod registry;
pub mod spec;

pub use manifest::{BuildSpec, Manifest, WMAKE};
pub use registry::PackageRegistry;

use crate::compat;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::state::InstalledRecord;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

/// Name reserved for opi itself
pub const SELF_NAME: &str = "opi";

/// Shared handle to a package; one per identity per operation
pub type PackageRef = Arc<Package>;

/// Where a package comes from
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Source {
    /// Resolved by name through the metadata index
    Index,
    /// A version-control URL
    Git(String),
    /// A directory on this machine
    Local(PathBuf),
    /// opi itself
    Tool,
}

impl Source {
    /// Classify an explicit origin
    ///
    /// `http(s)://` selects version control, `file://` and anything else a
    /// local path (made absolute).
    pub fn from_origin(origin: &str) -> Result<Self> {
        let origin = origin.trim();
        if origin.is_empty() {
            return Err(Error::InvalidOrigin(origin.to_string()));
        }

        if origin.starts_with("http://") || origin.starts_with("https://") {
            return Ok(Source::Git(origin.to_string()));
        }

        if origin.starts_with("file://") {
            let path = Url::parse(origin)
                .ok()
                .and_then(|url| url.to_file_path().ok())
                .ok_or_else(|| Error::InvalidOrigin(origin.to_string()))?;
            return Ok(Source::Local(path));
        }

        Ok(Source::Local(std::path::absolute(origin)?))
    }

    /// Origin string as persisted in the registry
    pub fn persisted_origin(&self) -> Option<String> {
        match self {
            Source::Git(url) => Some(url.clone()),
            Source::Local(path) => Url::from_file_path(path).ok().map(String::from),
            Source::Index | Source::Tool => None,
        }
    }

    /// Whether a recorded origin denotes this source
    fn matches_recorded(&self, recorded: Option<&str>) -> bool {
        match recorded {
            None => matches!(self, Source::Index),
            Some(origin) => Source::from_origin(origin).is_ok_and(|source| source == *self),
        }
    }
}

/// A package taking part in the current operation
pub struct Package {
    name: String,
    source: Source,
    manifest: OnceCell<Manifest>,
    upgrade_available: AtomicBool,
}

impl Package {
    pub(crate) fn new(name: String, source: Source) -> Self {
        Self {
            name,
            source,
            manifest: OnceCell::new(),
            upgrade_available: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn is_tool(&self) -> bool {
        self.source == Source::Tool
    }

    /// Manifest, if it has been fetched
    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.get()
    }

    /// Whether the last fetch saw an upstream change
    pub fn upgrade_available(&self) -> bool {
        self.upgrade_available.load(Ordering::Acquire)
    }

    /// Record for this identity, if installed
    ///
    /// A record under the same name but a different origin belongs to
    /// another identity and is not returned.
    pub fn installed_record(&self, ctx: &Context) -> Result<Option<InstalledRecord>> {
        if self.is_tool() {
            return Ok(None);
        }
        let record = ctx.store().read(|registry| registry.record(&self.name).cloned())?;
        Ok(record.filter(|record| self.source.matches_recorded(record.origin.as_deref())))
    }

    pub fn is_installed(&self, ctx: &Context) -> Result<bool> {
        if self.is_tool() {
            return Ok(true);
        }
        Ok(self.installed_record(ctx)?.is_some())
    }

    pub fn installed_sha(&self, ctx: &Context) -> Result<Option<String>> {
        Ok(self.installed_record(ctx)?.and_then(|record| record.sha))
    }

    /// Handles for the manifest's requirements
    pub fn requested_dependencies(&self, ctx: &Context) -> Result<Vec<PackageRef>> {
        match self.manifest() {
            Some(manifest) => manifest.requires.iter().map(|dep| ctx.package(dep)).collect(),
            None => Ok(Vec::new()),
        }
    }

    /// Handles for installed packages that recorded this one as a requirement
    pub fn installed_dependents(&self, ctx: &Context) -> Result<Vec<PackageRef>> {
        let names = ctx.store().read(|registry| registry.dependents_of(&self.name))?;
        names.iter().map(|name| ctx.package(name)).collect()
    }

    /// Fetch and validate the manifest once per operation
    ///
    /// Runs the compatibility check and build-step validation on first
    /// fetch; later calls return the cached manifest.
    pub async fn ensure_fetched(&self, ctx: &Context) -> Result<&Manifest> {
        self.manifest
            .get_or_try_init(|| async {
                let manifest = self.fetch(ctx).await?;
                compat::check(&self.name, &manifest.version, ctx.env().version())?;
                manifest.build_steps(&self.name)?;
                Ok::<_, Error>(manifest)
            })
            .await
    }

    async fn fetch(&self, ctx: &Context) -> Result<Manifest> {
        let progress = ctx.progress(&format!("Fetching {self}"));
        let result = self.fetch_source(ctx).await;
        match &result {
            Ok(_) => progress.finish_with_message("fetched"),
            Err(e) => progress.finish_with_error(&e.to_string()),
        }
        result
    }

    async fn fetch_source(&self, ctx: &Context) -> Result<Manifest> {
        let checkout = self.source_dir(ctx);
        let provider = ctx.provider();

        match &self.source {
            Source::Index => {
                let manifest = provider.index_manifest(&self.name).await?;
                let repo = self.index_repo(&manifest)?;
                let revision = provider.remote_revision(repo, &checkout).await?;
                self.note_revision(ctx, revision.as_deref())?;
                Ok(manifest)
            }
            Source::Git(url) => {
                let revision = match provider.remote_revision(url, &checkout).await? {
                    Some(revision) => revision,
                    None => provider.checkout(url, &checkout).await?,
                };
                let manifest = provider
                    .manifest_at(&checkout, &revision)
                    .await?
                    .unwrap_or_default();
                self.note_revision(ctx, Some(&revision))?;
                Ok(manifest)
            }
            Source::Local(path) => {
                let manifest = provider.local_manifest(path).await?.unwrap_or_default();
                self.upgrade_available.store(true, Ordering::Release);
                Ok(manifest)
            }
            Source::Tool => Err(Error::SelfManaged),
        }
    }

    /// Materialize the source tree; returns the revision to record
    pub async fn download(&self, ctx: &Context) -> Result<Option<String>> {
        let verb = if self.is_installed(ctx)? { "Updating" } else { "Downloading" };
        let progress = ctx.progress(&format!("{verb} {self}"));
        let result = self.download_source(ctx).await;
        match &result {
            Ok(_) => progress.finish_with_message("ready"),
            Err(e) => progress.finish_with_error(&e.to_string()),
        }
        result
    }

    async fn download_source(&self, ctx: &Context) -> Result<Option<String>> {
        let checkout = self.source_dir(ctx);
        let provider = ctx.provider();

        match &self.source {
            Source::Index => {
                let manifest = self.ensure_fetched(ctx).await?;
                let repo = self.index_repo(manifest)?;
                Ok(Some(provider.checkout(repo, &checkout).await?))
            }
            Source::Git(url) => Ok(Some(provider.checkout(url, &checkout).await?)),
            Source::Local(path) => {
                if let Some(parent) = checkout.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                provider.copy_local(path, &checkout).await?;
                Ok(None)
            }
            Source::Tool => Err(Error::SelfManaged),
        }
    }

    /// Directory the package builds in
    pub fn source_dir(&self, ctx: &Context) -> PathBuf {
        ctx.env().package_dir(&self.name)
    }

    fn index_repo<'m>(&self, manifest: &'m Manifest) -> Result<&'m str> {
        manifest.repo.as_deref().ok_or_else(|| Error::FetchFailed {
            package: self.name.clone(),
            reason: "index entry has no repository".to_string(),
        })
    }

    fn note_revision(&self, ctx: &Context, upstream: Option<&str>) -> Result<()> {
        let available = match upstream {
            None => true,
            Some(revision) => self.installed_sha(ctx)?.as_deref() != Some(revision),
        };
        debug!("{}: upstream {:?}, upgrade available: {}", self.name, upstream, available);
        self.upgrade_available.store(available, Ordering::Release);
        Ok(())
    }

    pub(crate) fn clear_upgrade(&self) {
        self.upgrade_available.store(false, Ordering::Release);
    }
}

impl PartialEq for Package {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.source == other.source
    }
}

impl Eq for Package {}

impl Hash for Package {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.source.hash(state);
    }
}

impl PartialOrd for Package {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Package {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&self.name, &self.source).cmp(&(&other.name, &other.source))
    }
}

impl fmt::Debug for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Package")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("fetched", &self.manifest.initialized())
            .finish()
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Source::Index | Source::Tool => write!(f, "{}", self.name),
            Source::Git(url) => write!(f, "{} @ {}", self.name, url),
            Source::Local(path) => match Url::from_file_path(path) {
                Ok(url) => write!(f, "{} @ {}", self.name, url),
                Err(()) => write!(f, "{} @ {}", self.name, path.display()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_classification() {
        assert_eq!(
            Source::from_origin("https://github.com/org/pkg.git").unwrap(),
            Source::Git("https://github.com/org/pkg.git".to_string())
        );
        assert_eq!(
            Source::from_origin("file:///opt/src/pkg").unwrap(),
            Source::Local(PathBuf::from("/opt/src/pkg"))
        );
        assert!(matches!(
            Source::from_origin("relative/dir").unwrap(),
            Source::Local(path) if path.is_absolute()
        ));
    }

    #[test]
    fn test_local_origin_round_trips_as_file_uri() {
        let source = Source::Local(PathBuf::from("/opt/src/my pkg"));
        let persisted = source.persisted_origin().unwrap();
        assert!(persisted.starts_with("file:///opt/src/my%20pkg"));
        assert_eq!(Source::from_origin(&persisted).unwrap(), source);
    }

    #[test]
    fn test_recorded_origin_matching() {
        assert!(Source::Index.matches_recorded(None));
        assert!(!Source::Index.matches_recorded(Some("https://x/y.git")));
        let git = Source::Git("https://x/y.git".to_string());
        assert!(git.matches_recorded(Some("https://x/y.git")));
        assert!(!git.matches_recorded(None));
    }

    #[test]
    fn test_display_forms() {
        let git = Package::new("foo".to_string(), Source::Git("https://x/foo.git".to_string()));
        assert_eq!(git.to_string(), "foo @ https://x/foo.git");
        let index = Package::new("bar".to_string(), Source::Index);
        assert_eq!(index.to_string(), "bar");
    }
}
