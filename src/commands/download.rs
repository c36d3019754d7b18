//! Download command - fetches package sources without building.

use anyhow::{bail, Context, Result};

use crate::config::Config;
use crate::fetch::SourceFetcher;
use crate::package::PackageStore;

use super::build::select_packages;

/// Execute the download command.
pub fn cmd_download(config: &Config, packages: &[String], world: bool) -> Result<()> {
    let store = PackageStore::new(&config.packages_dir);
    let targets = select_packages(&store, packages, world)?;
    if targets.is_empty() {
        bail!("no packages to download (name packages or pass --world)");
    }

    let fetcher = SourceFetcher::new(config);
    for pkg in &targets {
        if pkg.download.kind == "none" {
            println!("[{}] no source to download", pkg.package);
            continue;
        }
        fetcher
            .fetch(pkg)
            .with_context(|| format!("downloading source for {}", pkg.package))?;
        println!(
            "[{}] source: {}",
            pkg.package,
            fetcher.source_path(pkg).display()
        );
    }
    Ok(())
}
