// src/lib.rs

//! opi: installer for community OpenFOAM packages
//!
//! Packages are source trees built with the host toolchain into the user
//! platform directory. opi resolves their requirements, builds them in
//! dependency order and records what each build produced so it can be
//! removed again.
//!
//! # Architecture
//!
//! - Identity: a package is a name plus where it comes from; one shared
//!   handle per identity per operation
//! - State: a single locked JSON registry, written back once per operation
//! - Resolution: concurrent walk down requirements and up dependents
//! - Scheduling: concurrent fetch/download, serialized builds gated on
//!   per-package completion signals
//! - Attribution: artifacts inferred from output directory snapshots

pub mod compat;
pub mod config;
pub mod context;
mod error;
pub mod install;
pub mod package;
pub mod progress;
pub mod resolver;
pub mod runner;
pub mod source;
pub mod state;

pub use config::{Environment, Settings};
pub use context::Context;
pub use error::{Error, Result};
pub use install::{InstallReport, InstallScheduler, InstalledPackage, UninstallReport};
pub use package::{Package, PackageRef, Source};
pub use progress::{ProgressMode, ProgressTracker};
pub use runner::{BuildRunner, ShellBuildRunner};
pub use source::{GitSourceProvider, SourceProvider};
pub use state::{LockMode, StateStore};
