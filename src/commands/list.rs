//! List command - lists all package descriptors.

use anyhow::Result;

use crate::config::Config;
use crate::package::PackageStore;

/// Execute the list command.
pub fn cmd_list(config: &Config) -> Result<()> {
    let store = PackageStore::new(&config.packages_dir);
    let packages = store.list_all()?;

    if packages.is_empty() {
        println!(
            "No package descriptors found in {}",
            config.packages_dir.display()
        );
        return Ok(());
    }

    for pkg in packages {
        println!("{}: {}", pkg.package, pkg.version);
    }
    Ok(())
}
