// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.
//!
//! Provides a throwaway platform directory plus in-memory stand-ins for the
//! source provider and the build runner, so whole install/uninstall flows
//! run without network access or a toolchain.

#![allow(dead_code)]

use async_trait::async_trait;
use opi::package::Manifest;
use opi::{
    BuildRunner, Context, Environment, Error, ProgressMode, ProgressTracker, Result, ShellBuildRunner,
    SourceProvider,
};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Host version used by every test platform
pub const HOST_VERSION: u32 = 2406;

const MOCK_SCHEME: &str = "mock://";

/// A platform directory with empty `bin` and `lib`
///
/// Keep the value alive for the duration of the test.
pub struct TestPlatform {
    pub dir: TempDir,
    pub env: Environment,
}

pub fn platform() -> TestPlatform {
    let dir = tempfile::tempdir().unwrap();
    let env = Environment::new(dir.path().join("platform"), HOST_VERSION);
    fs::create_dir_all(env.bin_dir()).unwrap();
    fs::create_dir_all(env.lib_dir()).unwrap();
    TestPlatform { dir, env }
}

/// Manifest with the given requirements and a single build step
pub fn manifest(requires: &[&str]) -> Manifest {
    Manifest {
        requires: requires.iter().map(|s| s.to_string()).collect(),
        build: opi::package::BuildSpec::Steps(vec!["make".to_string()]),
        ..Default::default()
    }
}

/// In-memory metadata index; every package is index-hosted
#[derive(Default)]
pub struct MockSource {
    manifests: Mutex<HashMap<String, Manifest>>,
    revisions: Mutex<HashMap<String, String>>,
    /// Checkouts that fail once the delay has passed
    broken: Mutex<HashMap<String, Duration>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `name` at revision "1"
    pub fn add(&self, name: &str, manifest: Manifest) -> &Self {
        self.manifests.lock().unwrap().insert(name.to_string(), manifest);
        self.set_revision(name, "1");
        self
    }

    /// Move upstream of `name` to `revision`
    pub fn set_revision(&self, name: &str, revision: &str) {
        self.revisions
            .lock()
            .unwrap()
            .insert(name.to_string(), revision.to_string());
    }

    /// Checkouts of `name` fail after `delay`
    pub fn fail_checkout_after(&self, name: &str, delay: Duration) -> &Self {
        self.broken.lock().unwrap().insert(name.to_string(), delay);
        self
    }

    fn name_of(repo: &str) -> &str {
        repo.strip_prefix(MOCK_SCHEME).unwrap_or(repo)
    }

    fn revision(&self, repo: &str) -> Option<String> {
        self.revisions.lock().unwrap().get(Self::name_of(repo)).cloned()
    }
}

#[async_trait]
impl SourceProvider for MockSource {
    async fn index_manifest(&self, name: &str) -> Result<Manifest> {
        let manifest = self.manifests.lock().unwrap().get(name).cloned();
        match manifest {
            Some(mut manifest) => {
                manifest.repo = Some(format!("{MOCK_SCHEME}{name}"));
                Ok(manifest)
            }
            None => Err(Error::FetchFailed {
                package: name.to_string(),
                reason: "not in index".to_string(),
            }),
        }
    }

    async fn remote_revision(&self, repo: &str, _checkout: &Path) -> Result<Option<String>> {
        Ok(self.revision(repo))
    }

    async fn checkout(&self, repo: &str, checkout: &Path) -> Result<String> {
        let delay = self.broken.lock().unwrap().get(Self::name_of(repo)).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
            return Err(Error::FetchFailed {
                package: Self::name_of(repo).to_string(),
                reason: "connection reset".to_string(),
            });
        }
        let revision = self.revision(repo).ok_or_else(|| Error::FetchFailed {
            package: Self::name_of(repo).to_string(),
            reason: "no such repository".to_string(),
        })?;
        fs::create_dir_all(checkout)?;
        fs::write(checkout.join("REVISION"), &revision)?;
        Ok(revision)
    }

    async fn manifest_at(&self, _checkout: &Path, _revision: &str) -> Result<Option<Manifest>> {
        Ok(None)
    }
}

/// One observed build step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    Start(String),
    End(String),
}

/// Build runner that writes configured output files instead of compiling
pub struct MockRunner {
    platform: PathBuf,
    /// Package name to output paths relative to the platform directory
    outputs: Mutex<HashMap<String, Vec<String>>>,
    failing: Mutex<HashSet<String>>,
    clobbering: Mutex<HashSet<String>>,
    events: Mutex<Vec<BuildEvent>>,
    envs: Mutex<HashMap<String, Vec<(String, String)>>>,
}

impl MockRunner {
    pub fn new(env: &Environment) -> Self {
        Self {
            platform: env.platform().to_path_buf(),
            outputs: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            clobbering: Mutex::new(HashSet::new()),
            events: Mutex::new(Vec::new()),
            envs: Mutex::new(HashMap::new()),
        }
    }

    /// Files a build of `name` produces, e.g. `bin/solver`
    pub fn produces(&self, name: &str, files: &[&str]) -> &Self {
        self.outputs
            .lock()
            .unwrap()
            .insert(name.to_string(), files.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Builds of `name` write their outputs and then fail
    pub fn fail(&self, name: &str) -> &Self {
        self.failing.lock().unwrap().insert(name.to_string());
        self
    }

    /// Builds of `name` replace their source tree with a plain file
    pub fn clobber_source(&self, name: &str) -> &Self {
        self.clobbering.lock().unwrap().insert(name.to_string());
        self
    }

    pub fn events(&self) -> Vec<BuildEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Package names in the order their builds started
    pub fn build_order(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                BuildEvent::Start(name) => Some(name),
                BuildEvent::End(_) => None,
            })
            .collect()
    }

    pub fn env_of(&self, name: &str) -> Vec<(String, String)> {
        self.envs.lock().unwrap().get(name).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl BuildRunner for MockRunner {
    async fn run_step(
        &self,
        package: &str,
        _command: &str,
        workdir: &Path,
        env: &[(String, String)],
        _progress: &dyn ProgressTracker,
    ) -> Result<()> {
        assert!(workdir.is_dir(), "build ran without a source tree");
        self.events.lock().unwrap().push(BuildEvent::Start(package.to_string()));
        self.envs.lock().unwrap().insert(package.to_string(), env.to_vec());

        // Give other tasks a chance to interleave
        tokio::task::yield_now().await;

        let outputs = self.outputs.lock().unwrap().get(package).cloned().unwrap_or_default();
        for relative in outputs {
            let path = self.platform.join(relative);
            fs::create_dir_all(path.parent().unwrap())?;
            fs::write(&path, package)?;
        }

        if self.clobbering.lock().unwrap().contains(package) {
            fs::remove_dir_all(workdir)?;
            fs::write(workdir, "not a directory")?;
        }

        self.events.lock().unwrap().push(BuildEvent::End(package.to_string()));

        if self.failing.lock().unwrap().contains(package) {
            return Err(Error::BuildFailed {
                package: package.to_string(),
                stderr: "make: *** [all] Error 1".to_string(),
            });
        }
        Ok(())
    }
}

/// A silent context over the test platform
pub fn context(platform: &TestPlatform, source: &Arc<MockSource>, runner: &Arc<MockRunner>) -> Context {
    Context::new(
        platform.env.clone(),
        Arc::clone(source) as Arc<dyn SourceProvider>,
        Arc::clone(runner) as Arc<dyn BuildRunner>,
    )
    .with_progress(ProgressMode::Silent)
}

/// A silent context that runs real shell build steps
pub fn shell_context(platform: &TestPlatform, source: &Arc<MockSource>) -> Context {
    Context::new(
        platform.env.clone(),
        Arc::clone(source) as Arc<dyn SourceProvider>,
        Arc::new(ShellBuildRunner::new()) as Arc<dyn BuildRunner>,
    )
    .with_progress(ProgressMode::Silent)
}
