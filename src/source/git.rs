// src/source/git.rs

//! Index metadata over HTTP and package sources through the `git` CLI

use super::{MANIFEST_FILE, SourceProvider};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::package::Manifest;
use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Default provider: metadata from the package index, sources from git
pub struct GitSourceProvider {
    client: reqwest::Client,
    index_url: String,
}

impl GitSourceProvider {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::CommandFailed(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            index_url: settings.index_url.trim_end_matches('/').to_string(),
        })
    }

    async fn run_git(&self, checkout: Option<&Path>, args: &[&str]) -> Result<Output> {
        let mut cmd = Command::new("git");
        if let Some(dir) = checkout {
            cmd.arg("-C").arg(dir);
        }
        cmd.args(args);
        debug!("git {}", args.join(" "));

        cmd.output()
            .await
            .map_err(|e| Error::CommandFailed(format!("Failed to run git: {e}")))
    }

    async fn git(&self, checkout: Option<&Path>, args: &[&str]) -> Result<String> {
        let output = self.run_git(checkout, args).await?;
        if !output.status.success() {
            return Err(Error::CommandFailed(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Fetch the upstream default branch head into FETCH_HEAD
    async fn fetch_head(&self, repo: &str, checkout: &Path) -> Result<String> {
        self.git(Some(checkout), &["fetch", "--quiet", repo, "HEAD"])
            .await?;
        self.git(Some(checkout), &["rev-parse", "FETCH_HEAD"]).await
    }
}

fn has_checkout(dir: &Path) -> bool {
    dir.join(".git").exists()
}

#[async_trait]
impl SourceProvider for GitSourceProvider {
    async fn index_manifest(&self, name: &str) -> Result<Manifest> {
        let url = format!("{}/{}/{}", self.index_url, name, MANIFEST_FILE);
        debug!("Fetching index entry {}", url);

        let failed = |reason: String| Error::FetchFailed {
            package: name.to_string(),
            reason,
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| failed(e.to_string()))?;
        let text = response.text().await.map_err(|e| failed(e.to_string()))?;

        Manifest::from_json(&text).map_err(|e| failed(format!("invalid metadata: {e}")))
    }

    async fn remote_revision(&self, repo: &str, checkout: &Path) -> Result<Option<String>> {
        if !has_checkout(checkout) {
            return Ok(None);
        }
        self.fetch_head(repo, checkout).await.map(Some)
    }

    async fn checkout(&self, repo: &str, checkout: &Path) -> Result<String> {
        if has_checkout(checkout) {
            let revision = self.fetch_head(repo, checkout).await?;
            self.git(Some(checkout), &["reset", "--quiet", "--hard", &revision])
                .await?;
            return Ok(revision);
        }

        match tokio::fs::remove_dir_all(checkout).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if let Some(parent) = checkout.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let dest = checkout.to_string_lossy();
        self.git(None, &["clone", "--quiet", repo, &dest]).await?;
        self.git(Some(checkout), &["rev-parse", "HEAD"]).await
    }

    async fn manifest_at(&self, checkout: &Path, revision: &str) -> Result<Option<Manifest>> {
        let object = format!("{revision}:{MANIFEST_FILE}");
        let exists = self
            .run_git(Some(checkout), &["cat-file", "-e", &object])
            .await?;
        if !exists.status.success() {
            return Ok(None);
        }

        let text = self.git(Some(checkout), &["show", &object]).await?;
        Ok(Some(Manifest::from_json(&text)?))
    }
}
