// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: package specifiers
fn packages_arg(help: &'static str) -> Arg {
    Arg::new("packages")
        .required(true)
        .num_args(1..)
        .value_name("PACKAGE")
        .help(help)
}

fn build_cli() -> Command {
    Command::new("opi")
        .version(env!("CARGO_PKG_VERSION"))
        .author("opi Contributors")
        .about("Install community packages for OpenFOAM")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .global(true)
                .help("Increase log verbosity (-v info, -vv debug)"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("install")
                .about("Install packages and everything they require")
                .arg(packages_arg("Package names, origins (URL or path), or name@origin"))
                .arg(
                    Arg::new("upgrade")
                        .short('U')
                        .long("upgrade")
                        .action(ArgAction::SetTrue)
                        .help("Rebuild installed packages whose upstream has changed"),
                ),
        )
        .subcommand(
            Command::new("uninstall")
                .about("Remove installed packages")
                .arg(packages_arg("Package names or name@origin")),
        )
        .subcommand(Command::new("freeze").about("List installed package names"))
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("opi.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
