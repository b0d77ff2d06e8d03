// src/commands/uninstall.rs
//! Package removal command

use super::open_context;
use anyhow::Result;
use opi::install::uninstall_all;

/// Remove installed packages
pub fn cmd_uninstall(specifiers: &[String]) -> Result<()> {
    let ctx = open_context()?;
    let packages = ctx.packages(specifiers)?;

    let report = uninstall_all(&ctx, &packages)?;
    for name in &report.removed {
        println!("Uninstalled {}", name);
    }
    for name in &report.skipped {
        println!("{} is not installed", name);
    }
    Ok(())
}
