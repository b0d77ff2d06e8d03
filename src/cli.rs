// src/cli.rs
//! CLI definitions for opi
//!
//! The actual command implementations are in the `commands` module.

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "opi")]
#[command(version)]
#[command(about = "Install community packages for OpenFOAM", long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install packages and everything they require
    Install {
        /// Package names, origins (URL or path), or name@origin
        #[arg(required = true)]
        packages: Vec<String>,

        /// Rebuild installed packages whose upstream has changed
        #[arg(short = 'U', long)]
        upgrade: bool,
    },

    /// Remove installed packages
    Uninstall {
        /// Package names or name@origin
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// List installed package names
    Freeze,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_install_upgrade() {
        let cli = Cli::try_parse_from(["opi", "-vv", "install", "--upgrade", "foo", "bar"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Install { packages, upgrade } => {
                assert_eq!(packages, vec!["foo", "bar"]);
                assert!(upgrade);
            }
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn test_install_requires_packages() {
        assert!(Cli::try_parse_from(["opi", "install"]).is_err());
    }
}
