// src/commands/mod.rs
//! Command handlers for the opi CLI

mod freeze;
mod install;
mod uninstall;

pub use freeze::cmd_freeze;
pub use install::cmd_install;
pub use uninstall::cmd_uninstall;

use anyhow::Result;
use opi::{Context, Environment, GitSourceProvider, ProgressMode, Settings, ShellBuildRunner};
use std::io::IsTerminal;
use std::sync::Arc;

/// Build the context for one invocation from the process environment
fn open_context() -> Result<Context> {
    let env = Environment::from_env()?;
    let settings = Settings::from_env();
    let provider = GitSourceProvider::new(&settings)?;

    let progress = if std::io::stderr().is_terminal() {
        ProgressMode::Cli
    } else {
        ProgressMode::Log
    };

    Ok(Context::new(env, Arc::new(provider), Arc::new(ShellBuildRunner::new())).with_progress(progress))
}
