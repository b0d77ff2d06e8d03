// src/commands/freeze.rs
//! List installed packages

use super::open_context;
use anyhow::{Context as _, Result};
use opi::LockMode;

/// Print installed package names, one per line, sorted
pub fn cmd_freeze() -> Result<()> {
    let ctx = open_context()?;
    let store = ctx.store();

    let guard = store
        .acquire(LockMode::Shared)
        .with_context(|| format!("Failed to open {}", store.path().display()))?;
    let names: Vec<String> = store.read(|registry| registry.packages.keys().cloned().collect())?;
    guard.release()?;

    for name in names {
        println!("{}", name);
    }
    Ok(())
}
