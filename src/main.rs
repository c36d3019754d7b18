//! Crossforge - declarative cross-compilation build orchestrator.
//!
//! Builds packages described by JSON descriptors for a set of target
//! triplets, caching outputs by content fingerprint so unchanged packages
//! are never rebuilt.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crossforge::commands;
use crossforge::config::Config;
use crossforge::host::HostCatalog;

#[derive(Parser)]
#[command(name = "crossforge")]
#[command(about = "Declarative cross-compilation build orchestrator")]
#[command(
    after_help = "QUICK START:\n  crossforge hosts                    List supported triplets\n  crossforge build --host <t> <pkg>   Build a package\n  crossforge validate                 Check descriptors for errors\n  crossforge deps --host <t> <pkg>    Show the dependency tree"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build packages (dependencies are built automatically)
    Build {
        /// Packages to build
        packages: Vec<String>,

        /// Target triplet to build for
        #[arg(long, default_value = "x86_64-linux-gnu")]
        host: String,

        /// Build every package in the descriptor directory
        #[arg(long)]
        world: bool,

        /// Extract the built packages into the host environment root
        #[arg(long)]
        extract: bool,
    },

    /// Download package sources without building
    Download {
        /// Packages to download
        packages: Vec<String>,

        /// Download every package's source
        #[arg(long)]
        world: bool,
    },

    /// Extract a built package archive
    Extract {
        /// Package to extract
        package: String,

        /// Target triplet the package was built for
        #[arg(long, default_value = "x86_64-linux-gnu")]
        host: String,

        /// Destination (default: the host environment root)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List all package descriptors
    List,

    /// Show breadth-first dependency levels for a package
    Deps {
        /// Root package
        package: String,

        /// Target triplet filtering the dependency view
        #[arg(long, default_value = "x86_64-linux-gnu")]
        host: String,
    },

    /// Validate descriptors: dependency names, patterns, cycles
    Validate,

    /// Remove ephemeral build state and stale built artifacts
    Clean,

    /// List supported host triplets
    Hosts,

    /// Show the active configuration
    Config,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let base_dir = std::env::current_dir()?;

    // Load .env if present
    dotenvy::dotenv().ok();
    let config = Config::load(&base_dir);
    let catalog = HostCatalog::new();

    match cli.command {
        Commands::Build {
            packages,
            host,
            world,
            extract,
        } => commands::cmd_build(&config, &catalog, &host, &packages, world, extract)?,

        Commands::Download { packages, world } => {
            commands::cmd_download(&config, &packages, world)?
        }

        Commands::Extract {
            package,
            host,
            output,
        } => commands::cmd_extract(&config, &catalog, &host, &package, output.as_deref())?,

        Commands::List => commands::cmd_list(&config)?,

        Commands::Deps { package, host } => commands::cmd_deps(&config, &package, &host)?,

        Commands::Validate => commands::cmd_validate(&config, &catalog)?,

        Commands::Clean => commands::cmd_clean(&config, &catalog)?,

        Commands::Hosts => {
            for triplet in catalog.triplets() {
                println!("{triplet}");
            }
        }

        Commands::Config => config.print(),
    }

    Ok(())
}
