//! Build caching - content-fingerprint rebuild detection.
//!
//! A package's fingerprint is the SHA256 of its canonical info document:
//! the resolved descriptor, every direct dependency descriptor that matches
//! the host, and the composed environment minus PATH. The document doubles
//! as the on-disk cache marker; a build is skipped only when the stored
//! marker matches a freshly computed document byte for byte.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::envcomp;
use crate::error::Result;
use crate::host::Host;
use crate::package::{PackageDescriptor, PackageStore};

/// Fingerprint computation and cache paths for built packages.
pub struct BuildCache<'a> {
    config: &'a Config,
    store: &'a PackageStore,
}

impl<'a> BuildCache<'a> {
    pub fn new(config: &'a Config, store: &'a PackageStore) -> Self {
        Self { config, store }
    }

    /// The canonical info document for `(pkg, host)`.
    ///
    /// Keys are ordered (`_env`, `_target`, then dependency names), nested
    /// descriptors serialize in declaration order, and the volatile seed
    /// values (PATH, CPU count, data-root paths) are removed from `_env`,
    /// so the bytes are stable across machines and checkouts given
    /// identical inputs. A dependency name that doesn't resolve is a hard
    /// error here, not a skip.
    ///
    /// Only direct dependency descriptors are embedded; a change deeper in
    /// the tree reaches this document only through the intermediate
    /// descriptors' own content.
    pub fn info_document(&self, pkg: &PackageDescriptor, host: &Host) -> Result<String> {
        let mut doc: BTreeMap<String, serde_json::Value> = BTreeMap::new();
        doc.insert("_target".to_string(), serde_json::to_value(pkg)?);

        for dep in pkg.host_dependencies(&host.triplet)? {
            let dep_pkg = self.store.find(&dep)?;
            doc.insert(dep, serde_json::to_value(&dep_pkg)?);
        }

        let mut env = envcomp::package_env(self.config, host, pkg)?;
        for key in envcomp::VOLATILE_KEYS {
            env.remove(*key);
        }
        doc.insert("_env".to_string(), serde_json::to_value(&env)?);

        Ok(serde_json::to_string_pretty(&doc)?)
    }

    /// Full fingerprint digest, hex-encoded.
    pub fn fingerprint(&self, pkg: &PackageDescriptor, host: &Host) -> Result<String> {
        let info = self.info_document(pkg, host)?;
        let mut hasher = Sha256::new();
        hasher.update(info.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Content-addressed identifier: `<name>-<version>-<hash8>`.
    ///
    /// The hierarchical package name keeps its slashes, so identifiers used
    /// as paths land in per-package subdirectories.
    pub fn short_name(&self, pkg: &PackageDescriptor, host: &Host) -> Result<String> {
        let hash = self.fingerprint(pkg, host)?;
        Ok(format!("{}-{}-{}", pkg.package, pkg.version, &hash[..8]))
    }

    /// Path of the built content archive.
    pub fn built_archive_path(&self, pkg: &PackageDescriptor, host: &Host) -> Result<PathBuf> {
        Ok(self
            .config
            .built_dir(&host.triplet)
            .join(format!("{}.tar.gz", self.short_name(pkg, host)?)))
    }

    /// Path of the info marker next to the content archive.
    pub fn marker_path(&self, pkg: &PackageDescriptor, host: &Host) -> Result<PathBuf> {
        Ok(self
            .config
            .built_dir(&host.triplet)
            .join(format!("{}.info.txt", self.short_name(pkg, host)?)))
    }

    /// Ephemeral work root for one build attempt.
    pub fn work_path(&self, pkg: &PackageDescriptor, host: &Host) -> Result<PathBuf> {
        Ok(self
            .config
            .work_dir(&host.triplet)
            .join(self.short_name(pkg, host)?))
    }

    /// Ephemeral staging root for one build attempt.
    pub fn staging_path(&self, pkg: &PackageDescriptor, host: &Host) -> Result<PathBuf> {
        Ok(self
            .config
            .staging_dir(&host.triplet)
            .join(self.short_name(pkg, host)?))
    }

    /// Whether `(pkg, host)` must be (re)built.
    ///
    /// True when no marker exists or the stored marker differs from a fresh
    /// document. A stale marker is never partially trusted.
    pub fn should_build(&self, pkg: &PackageDescriptor, host: &Host) -> Result<bool> {
        let marker = self.marker_path(pkg, host)?;
        let stored = match fs::read_to_string(&marker) {
            Ok(s) => s,
            Err(_) => return Ok(true),
        };
        Ok(stored != self.info_document(pkg, host)?)
    }

    /// Write the marker for a successful build. Only called after the
    /// content archive exists.
    pub fn persist(&self, pkg: &PackageDescriptor, host: &Host) -> Result<()> {
        let marker = self.marker_path(pkg, host)?;
        if let Some(parent) = marker.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&marker, self.info_document(pkg, host)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostCatalog;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_descriptor(dir: &Path, name: &str, body: &str) {
        let path = dir.join(format!("{name}.json"));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn descriptor(name: &str, version: &str, step: &str) -> String {
        format!(
            r#"{{"package": "{name}", "version": "{version}", "type": "native",
                "download": {{"kind": "none", "url": "", "sha256": ""}},
                "build": {{"env": ["all:FOO=bar"], "steps": ["{step}"]}},
                "dependencies": []}}"#
        )
    }

    struct Fixture {
        _tmp: TempDir,
        config: Config,
        store: PackageStore,
        catalog: HostCatalog,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let pkgs = tmp.path().join("packages");
            fs::create_dir_all(&pkgs).unwrap();
            write_descriptor(
                &pkgs,
                "native/bootstrap/make",
                &descriptor("native/bootstrap/make", "4.4", "all:make install"),
            );
            let config = Config {
                data_root: tmp.path().join("data"),
                packages_dir: pkgs.clone(),
                patches_dir: tmp.path().join("patches"),
                source_mirror: None,
                builder: "linux_x86_64".to_string(),
            };
            Self {
                _tmp: tmp,
                config,
                store: PackageStore::new(pkgs),
                catalog: HostCatalog::new(),
            }
        }
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let f = Fixture::new();
        let cache = BuildCache::new(&f.config, &f.store);
        let host = f.catalog.get("x86_64-linux-gnu").unwrap();
        let pkg = f.store.find("native/bootstrap/make").unwrap();

        let a = cache.fingerprint(&pkg, host).unwrap();
        let b = cache.fingerprint(&pkg, host).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn fingerprint_changes_with_step_and_env_and_version() {
        let f = Fixture::new();
        let cache = BuildCache::new(&f.config, &f.store);
        let host = f.catalog.get("x86_64-linux-gnu").unwrap();
        let base = f.store.find("native/bootstrap/make").unwrap();
        let original = cache.fingerprint(&base, host).unwrap();

        let mut changed = base.clone();
        changed.build.steps[0] = "all:make -j2 install".to_string();
        assert_ne!(cache.fingerprint(&changed, host).unwrap(), original);

        let mut changed = base.clone();
        changed.build.env.push("all:EXTRA=1".to_string());
        assert_ne!(cache.fingerprint(&changed, host).unwrap(), original);

        let mut changed = base.clone();
        changed.version = "4.5".to_string();
        assert_ne!(cache.fingerprint(&changed, host).unwrap(), original);
    }

    #[test]
    fn info_document_excludes_volatile_seed_values() {
        let f = Fixture::new();
        let cache = BuildCache::new(&f.config, &f.store);
        let host = f.catalog.get("x86_64-linux-gnu").unwrap();
        let pkg = f.store.find("native/bootstrap/make").unwrap();

        let doc = cache.info_document(&pkg, host).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&doc).unwrap();
        for key in ["PATH", "NUM_CORES", "PATCH_DIR", "PREFIX", "HOST_PREFIX"] {
            assert!(parsed["_env"].get(key).is_none(), "{key} should be stripped");
        }
        // Descriptor-declared variables stay in.
        assert_eq!(parsed["_env"]["FOO"], "bar");
        assert_eq!(parsed["_target"]["package"], "native/bootstrap/make");
    }

    #[test]
    fn fingerprint_is_independent_of_the_data_root_location() {
        // Two checkouts of the same descriptor set, different data roots:
        // the digest must not move.
        let a = Fixture::new();
        let b = Fixture::new();
        let host = a.catalog.get("x86_64-linux-gnu").unwrap();

        let cache_a = BuildCache::new(&a.config, &a.store);
        let cache_b = BuildCache::new(&b.config, &b.store);
        let pkg_a = a.store.find("native/bootstrap/make").unwrap();
        let pkg_b = b.store.find("native/bootstrap/make").unwrap();

        assert_eq!(
            cache_a.fingerprint(&pkg_a, host).unwrap(),
            cache_b.fingerprint(&pkg_b, host).unwrap()
        );
    }

    #[test]
    fn missing_dependency_is_a_hard_error() {
        let f = Fixture::new();
        let cache = BuildCache::new(&f.config, &f.store);
        let host = f.catalog.get("x86_64-linux-gnu").unwrap();
        let mut pkg = f.store.find("native/bootstrap/make").unwrap();
        pkg.dependencies.push("all:no/such/dep".to_string());

        assert!(cache.info_document(&pkg, host).is_err());
    }

    #[test]
    fn should_build_follows_marker_state() {
        let f = Fixture::new();
        let cache = BuildCache::new(&f.config, &f.store);
        let host = f.catalog.get("x86_64-linux-gnu").unwrap();
        let pkg = f.store.find("native/bootstrap/make").unwrap();

        // No marker yet
        assert!(cache.should_build(&pkg, host).unwrap());

        // Marker written: up to date
        cache.persist(&pkg, host).unwrap();
        assert!(!cache.should_build(&pkg, host).unwrap());

        // Corrupted marker: rebuild
        let marker = cache.marker_path(&pkg, host).unwrap();
        fs::write(&marker, "garbage").unwrap();
        assert!(cache.should_build(&pkg, host).unwrap());
    }

    #[test]
    fn short_name_embeds_hash_prefix() {
        let f = Fixture::new();
        let cache = BuildCache::new(&f.config, &f.store);
        let host = f.catalog.get("x86_64-linux-gnu").unwrap();
        let pkg = f.store.find("native/bootstrap/make").unwrap();

        let hash = cache.fingerprint(&pkg, host).unwrap();
        let short = cache.short_name(&pkg, host).unwrap();
        assert_eq!(
            short,
            format!("native/bootstrap/make-4.4-{}", &hash[..8])
        );
    }
}
