// src/error.rs

//! Error types for opi
//!
//! Every variant except `Io`/`Json` corresponds to a condition that aborts
//! the whole operation. Non-fatal conditions are logged with `warn!` at the
//! point they are detected and never surface here.

use thiserror::Error;

/// Errors produced by the opi library
#[derive(Error, Debug)]
pub enum Error {
    /// The host toolchain environment is missing or inconsistent
    #[error(
        "No OpenFOAM environment found ({0}). Please activate (source) the OpenFOAM environment first."
    )]
    Environment(String),

    /// installed.json was written by a newer opi
    #[error("installed.json has schema version {found}, expected {expected}. Please upgrade opi.")]
    SchemaVersion { found: String, expected: u32 },

    /// Package name does not match the slug grammar
    #[error("Invalid package name: {0}")]
    InvalidName(String),

    /// Origin string that names neither a URL nor a usable path
    #[error("Invalid package origin: {0}")]
    InvalidOrigin(String),

    /// Attempt to use the tool's own name for a foreign package
    #[error("'{0}' not allowed as a package name")]
    ReservedName(String),

    /// Two identities with the same name in one operation
    #[error("duplicate/conflicting package names: {}", .0.join(", "))]
    DuplicateNames(Vec<String>),

    /// A specifier of the host's distro family rejected the host version
    #[error("OpenFOAM version is {host}, but {package} requires {spec}")]
    VersionMismatch {
        package: String,
        host: u32,
        spec: String,
    },

    /// No declared specifier applies to the host's distro family
    #[error(
        "{package} is not compatible with this OpenFOAM distribution (requires {})",
        .specs.join(", ")
    )]
    IncompatibleDistribution { package: String, specs: Vec<String> },

    /// Manifest names a build system other than wmake
    #[error("{package}: unsupported build system: {build}")]
    UnsupportedBuildSystem { package: String, build: String },

    /// Requirement graph contains a cycle; holds the full path
    #[error("dependency cycle detected: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    /// A build step exited unsuccessfully
    #[error("failed to build package '{package}'\n{stderr}")]
    BuildFailed { package: String, stderr: String },

    /// Uninstall requested for packages that still have dependents
    #[error("Cannot uninstall {}: required by {}", .packages.join(","), .dependents.join(","))]
    HasDependents {
        packages: Vec<String>,
        dependents: Vec<String>,
    },

    /// Metadata or source retrieval failed
    #[error("Failed to fetch package '{package}': {reason}")]
    FetchFailed { package: String, reason: String },

    /// The tool's own package cannot be changed through itself
    #[error("opi cannot be upgraded or uninstalled this way; use the tool that installed it")]
    SelfManaged,

    /// A dependency's install did not complete
    #[error("dependency '{0}' of this operation did not finish installing")]
    DependencyAborted(String),

    /// External command failure outside of a package build
    #[error("{0}")]
    CommandFailed(String),

    /// State store misuse or corruption
    #[error("state error: {0}")]
    State(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for opi operations
pub type Result<T> = std::result::Result<T, Error>;
