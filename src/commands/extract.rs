//! Extract command - extracts built package archives.

use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::build::Builder;
use crate::config::Config;
use crate::host::HostCatalog;
use crate::package::PackageStore;
use crate::process::ShellRunner;

/// Execute the extract command.
///
/// The destination defaults to the host's environment root, the same place
/// dependency archives land during builds.
pub fn cmd_extract(
    config: &Config,
    catalog: &HostCatalog,
    triplet: &str,
    package: &str,
    output: Option<&Path>,
) -> Result<()> {
    let Some(host) = catalog.get(triplet) else {
        bail!("host {triplet} not supported");
    };

    let store = PackageStore::new(&config.packages_dir);
    let pkg = store.find(package)?;

    let env_root = config.env_root(triplet);
    let dest = output.unwrap_or(&env_root);
    std::fs::create_dir_all(dest)?;

    let runner = ShellRunner;
    let builder = Builder::new(config, &store, &runner);
    builder
        .extract_env(&pkg, host, dest)
        .with_context(|| format!("extracting {}", pkg.package))?;

    println!("[{}] extracted into {}", pkg.package, dest.display());
    Ok(())
}
