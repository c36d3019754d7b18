//! Clean command - removes ephemeral state and stale built artifacts.
//!
//! Work, staging and env trees are always safe to delete; they carry no
//! state between builds. Built artifacts are pruned down to the entries
//! whose names still match a current descriptor fingerprint, so outputs of
//! edited packages don't accumulate forever.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use walkdir::WalkDir;

use crate::cache::BuildCache;
use crate::config::Config;
use crate::host::HostCatalog;
use crate::package::PackageStore;

/// Execute the clean command.
pub fn cmd_clean(config: &Config, catalog: &HostCatalog) -> Result<()> {
    let store = PackageStore::new(&config.packages_dir);
    let cache = BuildCache::new(config, &store);

    // Current artifact paths for every (package, host) pair. Descriptor
    // errors abort: an empty keep set would prune everything.
    let mut keep: HashSet<PathBuf> = HashSet::new();
    let packages = store.list_all()?;
    for pkg in &packages {
        for host in catalog.iter() {
            if let Ok(archive) = cache.built_archive_path(pkg, host) {
                keep.insert(archive);
            }
            if let Ok(marker) = cache.marker_path(pkg, host) {
                keep.insert(marker);
            }
        }
    }
    println!("Keeping {} current build file(s)", keep.len());

    let built_root = config.builder_dir().join("built");
    if built_root.exists() {
        for entry in WalkDir::new(&built_root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path().to_path_buf();
            if !keep.contains(&path) {
                println!("Removing stale build file: {}", path.display());
                if let Err(e) = fs::remove_file(&path) {
                    log::warn!("failed to remove {}: {e}", path.display());
                }
            }
        }
    }

    for name in ["work", "staging", "env"] {
        let dir = config.builder_dir().join(name);
        if dir.exists() {
            println!("Removing directory: {}", dir.display());
            fs::remove_dir_all(&dir)?;
        }
    }

    println!("Clean complete");
    Ok(())
}
