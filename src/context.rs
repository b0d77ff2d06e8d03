// src/context.rs

//! Per-operation context
//!
//! One `Context` is built per command invocation and threaded through
//! resolution, scheduling and uninstall. It owns the identity registry, the
//! state store, the build lock and the external collaborators; dropping it
//! ends the operation.

use crate::config::Environment;
use crate::error::Result;
use crate::package::{PackageRef, PackageRegistry};
use crate::progress::{ProgressMode, ProgressTracker};
use crate::runner::BuildRunner;
use crate::source::SourceProvider;
use crate::state::StateStore;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

pub struct Context {
    env: Environment,
    store: StateStore,
    registry: PackageRegistry,
    provider: Arc<dyn SourceProvider>,
    runner: Arc<dyn BuildRunner>,
    /// Serializes build tool invocations across the whole process
    build_lock: Mutex<()>,
    progress: ProgressMode,
}

impl Context {
    pub fn new(
        env: Environment,
        provider: Arc<dyn SourceProvider>,
        runner: Arc<dyn BuildRunner>,
    ) -> Self {
        Self {
            store: StateStore::new(env.registry_path()),
            env,
            registry: PackageRegistry::new(),
            provider,
            runner,
            build_lock: Mutex::new(()),
            progress: ProgressMode::default(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressMode) -> Self {
        self.progress = progress;
        self
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn registry(&self) -> &PackageRegistry {
        &self.registry
    }

    pub fn provider(&self) -> &dyn SourceProvider {
        self.provider.as_ref()
    }

    pub fn runner(&self) -> &dyn BuildRunner {
        self.runner.as_ref()
    }

    /// Handle for a specifier, through the identity registry
    pub fn package(&self, specifier: &str) -> Result<PackageRef> {
        self.registry.get(specifier, &self.store)
    }

    /// Handles for several specifiers
    pub fn packages<S: AsRef<str>>(&self, specifiers: &[S]) -> Result<Vec<PackageRef>> {
        specifiers.iter().map(|s| self.package(s.as_ref())).collect()
    }

    /// Wait for exclusive use of the build tool
    pub async fn build_permit(&self) -> MutexGuard<'_, ()> {
        self.build_lock.lock().await
    }

    /// Start a status tracker for one step
    pub fn progress(&self, title: &str) -> Box<dyn ProgressTracker> {
        self.progress.start(title)
    }
}
