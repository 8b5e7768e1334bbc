// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("preflight")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Preflight Contributors")
        .about("Dry-run package update feasibility checks for yum repositories")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .global(true)
                .default_value("/etc/preflight/preflight.toml")
                .help("Configuration file"),
        )
        .arg(
            Arg::new("db_path")
                .short('d')
                .long("db-path")
                .value_name("PATH")
                .global(true)
                .help("Metadata cache database (overrides db_path from the configuration)"),
        )
        .subcommand(
            Command::new("version-check")
                .about("Check that the expected packages are available at one version")
                .arg(
                    Arg::new("version")
                        .long("version")
                        .required(true)
                        .help("Requested version, e.g. \"3.3\" or \"v3.3.0.1\""),
                )
                .arg(
                    Arg::new("package")
                        .short('p')
                        .long("package")
                        .action(ArgAction::Append)
                        .help("Package to check (repeatable; defaults to expected_packages)"),
                )
                .arg(
                    Arg::new("refresh")
                        .long("refresh")
                        .action(ArgAction::SetTrue)
                        .help("Contact mirrors when cached metadata has expired"),
                ),
        )
        .subcommand(
            Command::new("update-check")
                .about("Check that installing/updating packages would resolve")
                .arg(
                    Arg::new("packages")
                        .num_args(0..)
                        .help("Packages to install or update (updates everything if omitted)"),
                )
                .arg(
                    Arg::new("refresh")
                        .long("refresh")
                        .action(ArgAction::SetTrue)
                        .help("Contact mirrors when cached metadata has expired"),
                )
                .arg(
                    Arg::new("rpm")
                        .long("rpm")
                        .default_value("rpm")
                        .help("rpm binary used to read the installed packages"),
                )
                .arg(
                    Arg::new("root")
                        .long("root")
                        .value_name("PATH")
                        .help("Read the rpm database of this root instead of /"),
                ),
        )
        .subcommand(
            Command::new("image-check")
                .about("Check that the image for a component exists")
                .arg(Arg::new("component").long("component").help("Component name"))
                .arg(
                    Arg::new("docker")
                        .long("docker")
                        .default_value("docker")
                        .help("docker client to run"),
                ),
        )
        .subcommand(
            Command::new("makecache")
                .about("Refresh the repository metadata cache")
                .arg(
                    Arg::new("force")
                        .short('f')
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Refresh even if cached metadata has not expired"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("preflight.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
