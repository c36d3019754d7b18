//! Validate command - checks descriptors for configuration errors.
//!
//! Three passes over the whole descriptor set: dependency entries must
//! parse and resolve to existing descriptors, patterns should match at
//! least one supported host, and the dependency graph must be acyclic for
//! every host view plus the host-independent `all` view.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::error::Error;
use crate::graph::{self, CycleCheck};
use crate::host::HostCatalog;
use crate::package::{PackageDescriptor, PackageStore};
use crate::pattern::matches_triplet;

/// Execute the validate command.
pub fn cmd_validate(config: &Config, catalog: &HostCatalog) -> Result<()> {
    let store = PackageStore::new(&config.packages_dir);
    let packages = store.list_all()?;
    if packages.is_empty() {
        bail!(
            "no package descriptors found in {}",
            config.packages_dir.display()
        );
    }

    let mut errors = 0usize;
    for pkg in &packages {
        errors += check_dependencies(&store, catalog, pkg);
    }

    for triplet in catalog.triplets() {
        check_cycles(&packages, triplet)?;
    }
    check_cycles(&packages, "all")?;

    if errors > 0 {
        bail!("validation failed with {errors} error(s)");
    }
    println!("{} package(s) validated", packages.len());
    Ok(())
}

/// Check one package's dependency entries. Returns the error count.
fn check_dependencies(
    store: &PackageStore,
    catalog: &HostCatalog,
    pkg: &PackageDescriptor,
) -> usize {
    let entries = match pkg.dependency_entries() {
        Ok(entries) => entries,
        Err(e) => {
            println!("ERROR: {e}");
            return 1;
        }
    };

    let mut errors = 0;
    for entry in entries {
        let used_anywhere = catalog
            .triplets()
            .iter()
            .any(|t| matches_triplet(&entry.pattern, t));
        if !used_anywhere && entry.pattern != "none" {
            println!(
                "WARN: {}: pattern {:?} matches no supported host",
                pkg.package, entry.pattern
            );
        }

        if let Err(e) = store.find(&entry.payload) {
            println!("ERROR: {}: dependency {}: {e}", pkg.package, entry.payload);
            errors += 1;
        }
    }
    errors
}

/// A cycle for any view aborts validation entirely.
fn check_cycles(packages: &[PackageDescriptor], triplet: &str) -> Result<()> {
    match graph::detect_cycles(packages, triplet)? {
        CycleCheck::Ok => Ok(()),
        CycleCheck::CycleFound(path) => Err(Error::CyclicDependency {
            triplet: triplet.to_string(),
            path,
        }
        .into()),
    }
}
