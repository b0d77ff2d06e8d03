// src/commands/install.rs
//! Package installation command

use super::open_context;
use anyhow::Result;
use opi::InstallScheduler;
use tracing::info;

/// Install packages and their requirements
pub async fn cmd_install(specifiers: &[String], upgrade: bool) -> Result<()> {
    let ctx = open_context()?;
    let packages = ctx.packages(specifiers)?;
    info!("Installing {} requested package(s)", packages.len());

    let report = InstallScheduler::new(&ctx).install_all(&packages, upgrade).await?;

    for name in &report.satisfied {
        println!("{} is already installed", name);
    }

    for pkg in &report.installed {
        println!("Installed {}", pkg.name);
        if !pkg.apps.is_empty() {
            println!("  New applications: {}", pkg.apps.join(", "));
        }
        if !pkg.libs.is_empty() {
            println!("  New libraries: {}", pkg.libs.join(", "));
        }
    }

    if report.is_noop() && report.satisfied.is_empty() {
        println!("Nothing to do");
    }
    Ok(())
}
