//! The per-package build pipeline.
//!
//! `ensure_built` is the entry point: check the cache marker, and on a miss
//! run the full pipeline for that package. The pipeline stages are fixed:
//! resolve dependencies, assemble the dependency environment root, prepare
//! fresh work/staging roots, fetch and extract the source, run the
//! triplet-filtered steps, archive the staged install tree, persist the
//! cache marker. Any stage failure aborts the package; the marker is only
//! written after packaging succeeds, so a failed build never poisons the
//! cache.

use std::fs;
use std::path::{Path, PathBuf};

use crate::archive::{self, Compression};
use crate::cache::BuildCache;
use crate::config::Config;
use crate::envcomp;
use crate::error::{Error, Result};
use crate::fetch::SourceFetcher;
use crate::host::{self, Host};
use crate::package::{PackageDescriptor, PackageStore};
use crate::pattern::Entry;
use crate::process::StepRunner;

/// Drives package builds. Holds only borrowed collaborators; all state
/// lives on disk under the configured data root.
pub struct Builder<'a> {
    config: &'a Config,
    store: &'a PackageStore,
    runner: &'a dyn StepRunner,
}

impl<'a> Builder<'a> {
    pub fn new(config: &'a Config, store: &'a PackageStore, runner: &'a dyn StepRunner) -> Self {
        Self {
            config,
            store,
            runner,
        }
    }

    fn cache(&self) -> BuildCache<'a> {
        BuildCache::new(self.config, self.store)
    }

    /// Build `pkg` for `host` unless an up-to-date cache entry exists.
    pub fn ensure_built(&self, pkg: &PackageDescriptor, host: &Host) -> Result<()> {
        if !self.cache().should_build(pkg, host)? {
            log::info!("[{}] build cache up to date, skipping build", pkg.package);
            println!("[{}] skip (cached)", pkg.package);
            return Ok(());
        }
        log::info!("[{}] cache miss or stale, building", pkg.package);
        self.build(pkg, host, true)
    }

    /// Run the full pipeline for one package.
    ///
    /// With `build_deps` unset the dependency closure and the environment
    /// root are assumed to be already in place (the caller arranged them);
    /// the package's own stages still run.
    pub fn build(&self, pkg: &PackageDescriptor, host: &Host, build_deps: bool) -> Result<()> {
        let cache = self.cache();
        let work = cache.work_path(pkg, host)?;
        let staging = cache.staging_path(pkg, host)?;

        let result = self.build_inner(pkg, host, build_deps, &work, &staging);

        // Work and staging carry no state across builds: remove them on
        // success and failure alike.
        let _ = fs::remove_dir_all(&work);
        let _ = fs::remove_dir_all(&staging);
        result
    }

    fn build_inner(
        &self,
        pkg: &PackageDescriptor,
        host: &Host,
        build_deps: bool,
        work: &Path,
        staging: &Path,
    ) -> Result<()> {
        let cache = self.cache();
        let triplet = host.triplet.as_str();

        if build_deps {
            let mut deps = Vec::new();
            for dep_name in pkg.host_dependencies(triplet)? {
                let dep = self.store.find(&dep_name)?;
                self.ensure_built(&dep, host)?;
                deps.push(dep);
            }

            // The env root is shared per host: rebuild it from scratch so
            // only this package's dependencies are visible, extracting in
            // declaration order (later archives overwrite earlier files).
            let env_root = self.config.env_root(triplet);
            let _ = fs::remove_dir_all(&env_root);
            fs::create_dir_all(&env_root)?;
            for dep in &deps {
                self.extract_env(dep, host, &env_root)?;
            }
        }

        let _ = fs::remove_dir_all(work);
        let _ = fs::remove_dir_all(staging);
        fs::create_dir_all(work)?;
        fs::create_dir_all(staging)?;

        self.obtain_source(pkg, work)?;

        // The staged install tree mirrors the env root path, so extracting
        // the archive into `/` (or any env root) lands files where steps
        // installed them.
        let staged_prefix = join_absolute(staging, &self.config.env_root(triplet));
        let info_path = staged_prefix
            .join("usr/share/crossforge")
            .join(format!("{}.txt", cache.short_name(pkg, host)?));
        fs::create_dir_all(info_path.parent().unwrap())?;
        fs::write(&info_path, cache.info_document(pkg, host)?)?;

        self.run_steps(pkg, host, work, staging)?;

        let archive_path = cache.built_archive_path(pkg, host)?;
        if let Some(parent) = archive_path.parent() {
            fs::create_dir_all(parent)?;
        }
        archive::create_reproducible(&staged_prefix, &archive_path)?;

        cache.persist(pkg, host)?;
        log::info!("[{}] built: {}", pkg.package, archive_path.display());
        println!("[{}] built {}", pkg.package, archive_path.display());
        Ok(())
    }

    /// Extract a built package's output archive into `dest`.
    pub fn extract_env(&self, pkg: &PackageDescriptor, host: &Host, dest: &Path) -> Result<()> {
        let archive_path = self.cache().built_archive_path(pkg, host)?;
        archive::extract(&archive_path, dest, Compression::Gz)
    }

    /// Place the package source into the work root.
    fn obtain_source(&self, pkg: &PackageDescriptor, work: &Path) -> Result<()> {
        let fetcher = SourceFetcher::new(self.config);
        fetcher.fetch(pkg)?;

        let kind = pkg.download.kind.as_str();
        match kind {
            "none" => Ok(()),
            "git" => copy_tree(&fetcher.source_path(pkg), work),
            _ => {
                let compression =
                    Compression::from_kind(kind).ok_or_else(|| Error::UnsupportedKind {
                        package: pkg.package.clone(),
                        kind: kind.to_string(),
                    })?;
                archive::extract(&fetcher.source_path(pkg), work, compression)
            }
        }
    }

    /// Run the package's build steps that apply to this host.
    fn run_steps(
        &self,
        pkg: &PackageDescriptor,
        host: &Host,
        work: &Path,
        staging: &Path,
    ) -> Result<()> {
        let triplet = host.triplet.as_str();
        let steps: Vec<Entry> = pkg
            .step_entries()?
            .into_iter()
            .filter(|e| e.matches(triplet))
            .collect();
        if steps.is_empty() {
            return Ok(());
        }

        let env_root = self.config.env_root(triplet);
        let mut env = envcomp::package_env(self.config, host, pkg)?;
        let composed_path = env.get("PATH").cloned().unwrap_or_default();
        env.insert(
            "STAGING_DIR".to_string(),
            staging.to_string_lossy().into_owned(),
        );
        env.insert("HOST".to_string(), triplet.to_string());
        env.insert(
            "PREFIX".to_string(),
            env_root.to_string_lossy().into_owned(),
        );
        env.insert(
            "PATH".to_string(),
            format!(
                "{}/native/bin:{composed_path}:{}",
                env_root.display(),
                host::base_path()
            ),
        );

        for step in steps {
            log::info!("[{}] executing step: {}", pkg.package, step.payload);
            println!("[{}] $ {}", pkg.package, step.payload);
            let code = self.runner.run(&step.payload, work, &env)?;
            if code != 0 {
                return Err(Error::StepFailed {
                    package: pkg.package.clone(),
                    step: step.payload,
                    code,
                    dir: work.to_path_buf(),
                });
            }
        }
        Ok(())
    }
}

/// Join an absolute path beneath a root (`/a/b` under `/root` becomes
/// `/root/a/b`).
fn join_absolute(root: &Path, absolute: &Path) -> PathBuf {
    let mut joined = root.to_path_buf();
    for component in absolute.components() {
        if let std::path::Component::Normal(c) = component {
            joined.push(c);
        }
    }
    joined
}

/// Recursively copy a directory tree, preserving symlinks.
fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            let _ = fs::remove_file(&target);
            std::os::unix::fs::symlink(link, &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
