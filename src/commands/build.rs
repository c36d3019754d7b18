//! Build command - builds packages and optionally extracts them.

use anyhow::{bail, Context, Result};

use crate::build::Builder;
use crate::config::Config;
use crate::host::HostCatalog;
use crate::package::{PackageDescriptor, PackageStore};
use crate::process::ShellRunner;

/// Execute the build command.
pub fn cmd_build(
    config: &Config,
    catalog: &HostCatalog,
    triplet: &str,
    packages: &[String],
    world: bool,
    extract: bool,
) -> Result<()> {
    let Some(host) = catalog.get(triplet) else {
        bail!(
            "host {triplet} not supported (run 'crossforge hosts' for the list)"
        );
    };

    let store = PackageStore::new(&config.packages_dir);
    let targets = select_packages(&store, packages, world)?;
    if targets.is_empty() {
        bail!("no packages to build (name packages or pass --world)");
    }

    println!("Building for host: {triplet}");

    let runner = ShellRunner;
    let builder = Builder::new(config, &store, &runner);
    for pkg in &targets {
        builder
            .ensure_built(pkg, host)
            .with_context(|| format!("building {}", pkg.package))?;
    }

    if !extract {
        return Ok(());
    }

    let env_root = config.env_root(triplet);
    std::fs::create_dir_all(&env_root)?;
    for pkg in &targets {
        println!("[{}] extracting into {}", pkg.package, env_root.display());
        builder
            .extract_env(pkg, host, &env_root)
            .with_context(|| format!("extracting {}", pkg.package))?;
    }
    Ok(())
}

/// Resolve the requested package set: named packages, or the whole world.
pub fn select_packages(
    store: &PackageStore,
    packages: &[String],
    world: bool,
) -> Result<Vec<PackageDescriptor>> {
    if world {
        return Ok(store.list_all()?);
    }
    let mut targets = Vec::new();
    for name in packages {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        targets.push(store.find(name)?);
    }
    Ok(targets)
}
