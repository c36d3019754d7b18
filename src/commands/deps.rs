//! Deps command - prints breadth-first dependency levels.

use anyhow::Result;

use crate::config::Config;
use crate::graph;
use crate::package::PackageStore;

/// Execute the deps command.
///
/// Levels are distance buckets from the root; names within a level are
/// printed sorted.
pub fn cmd_deps(config: &Config, package: &str, triplet: &str) -> Result<()> {
    let store = PackageStore::new(&config.packages_dir);
    let levels = graph::dependency_levels(&store, package, triplet)?;

    for (depth, level) in levels.iter().enumerate() {
        let mut names = level.clone();
        names.sort();
        for name in names {
            match store.find(&name) {
                Ok(pkg) => println!("{depth}: {name} (version: {})", pkg.version),
                Err(e) => println!("{depth}: {name} (ERROR: {e})"),
            }
        }
    }
    Ok(())
}
