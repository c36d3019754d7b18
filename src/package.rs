//! Package descriptors and the descriptor store.
//!
//! A descriptor lives at `<packages-dir>/<name>.json` where the hierarchical
//! slash-separated name doubles as the relative path. Descriptors are read
//! fresh from disk on every query and never written back.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::pattern::Entry;

/// Packages injected as implicit dependencies into every non-bootstrap
/// descriptor. They provide the baseline native tooling build steps rely on.
pub const BOOTSTRAP_PACKAGES: &[&str] = &[
    "native/bootstrap/make",
    "native/bootstrap/perl",
    "native/bootstrap/cpan/archive-cpio",
    "native/bootstrap/cpan/archive-zip",
    "native/bootstrap/cpan/sub-override",
    "native/bootstrap/strip-nondeterminism",
];

/// Step appended to every non-bootstrap descriptor so archives come out
/// normalized regardless of the tools a package's own steps ran.
const BOOTSTRAP_STRIP_STEP: &str =
    "all:$PREFIX/native/bootstrap/bin/strip-nondeterminism-recursive $STAGING_DIR";

/// How a package's source is obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadSpec {
    /// `none`, `git`, `tar.gz`, `tar.bz2`, or `tar.xz`.
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub url: String,
    /// Content checksum for archives; git reference (commit/tag/branch) for
    /// `git` kind.
    #[serde(default)]
    pub sha256: String,
}

fn default_kind() -> String {
    "none".to_string()
}

impl Default for DownloadSpec {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            url: String::new(),
            sha256: String::new(),
        }
    }
}

/// Ordered environment layer and build steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub steps: Vec<String>,
}

/// A package descriptor, as stored on disk.
///
/// Field order is part of the fingerprint format: the canonical info
/// document serializes descriptors in this declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    /// Hierarchical slash-separated name; also the descriptor's relative
    /// path (without the `.json` extension).
    pub package: String,
    pub version: String,
    /// `native` for bootstrap/native tools, anything else targets the host.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub download: DownloadSpec,
    #[serde(default)]
    pub build: BuildSpec,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl PackageDescriptor {
    /// Whether this is a native (build-machine) package.
    pub fn is_native(&self) -> bool {
        self.kind == "native"
    }

    /// Bootstrap packages are exempt from implicit injection.
    pub fn is_bootstrap(&self) -> bool {
        self.package.contains("/bootstrap/")
    }

    /// Last path segment of the package name, used in artifact file names.
    pub fn base_name(&self) -> &str {
        self.package.rsplit('/').next().unwrap_or(&self.package)
    }

    /// Parsed dependency entries.
    pub fn dependency_entries(&self) -> Result<Vec<Entry>> {
        self.dependencies
            .iter()
            .map(|raw| {
                Entry::parse(raw).ok_or_else(|| Error::MalformedDependency {
                    package: self.package.clone(),
                    entry: raw.clone(),
                })
            })
            .collect()
    }

    /// Parsed build step entries.
    pub fn step_entries(&self) -> Result<Vec<Entry>> {
        self.build
            .steps
            .iter()
            .map(|raw| {
                Entry::parse(raw).ok_or_else(|| Error::MalformedStep {
                    package: self.package.clone(),
                    entry: raw.clone(),
                })
            })
            .collect()
    }

    /// Names of the dependencies that apply to `triplet`, in declaration
    /// order, patterns stripped.
    pub fn host_dependencies(&self, triplet: &str) -> Result<Vec<String>> {
        Ok(self
            .dependency_entries()?
            .into_iter()
            .filter(|e| e.matches(triplet))
            .map(|e| e.payload)
            .collect())
    }
}

/// Loads descriptors from the packages directory.
pub struct PackageStore {
    packages_dir: PathBuf,
}

impl PackageStore {
    pub fn new(packages_dir: impl Into<PathBuf>) -> Self {
        Self {
            packages_dir: packages_dir.into(),
        }
    }

    pub fn packages_dir(&self) -> &Path {
        &self.packages_dir
    }

    /// On-disk path of a descriptor.
    pub fn descriptor_path(&self, name: &str) -> PathBuf {
        self.packages_dir.join(format!("{name}.json"))
    }

    /// Load a descriptor by name.
    ///
    /// Verifies the descriptor's `package` field matches the path it was
    /// loaded from, then injects the implicit bootstrap dependencies and the
    /// normalization step for non-bootstrap packages.
    pub fn find(&self, name: &str) -> Result<PackageDescriptor> {
        let path = self.descriptor_path(name);
        let raw = fs::read_to_string(&path).map_err(|_| Error::PackageNotFound {
            name: name.to_string(),
            path: path.clone(),
        })?;
        let mut pkg: PackageDescriptor = serde_json::from_str(&raw)?;

        if pkg.package != name {
            return Err(Error::PackageNameMismatch {
                path,
                declared: pkg.package,
                expected: name.to_string(),
            });
        }

        if !pkg.is_bootstrap() {
            for bootstrap in BOOTSTRAP_PACKAGES {
                pkg.dependencies.push(format!("all:{bootstrap}"));
            }
            pkg.build.steps.push(BOOTSTRAP_STRIP_STEP.to_string());
        }

        Ok(pkg)
    }

    /// Load every descriptor under the packages directory, sorted by name.
    pub fn list_all(&self) -> Result<Vec<PackageDescriptor>> {
        let mut names = Vec::new();
        for entry in WalkDir::new(&self.packages_dir)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some("json")
            {
                continue;
            }
            let Ok(rel) = path.strip_prefix(&self.packages_dir) else {
                continue;
            };
            let name = rel.with_extension("");
            names.push(name.to_string_lossy().into_owned());
        }
        names.sort();

        let mut packages = Vec::with_capacity(names.len());
        for name in names {
            packages.push(self.find(&name)?);
        }
        Ok(packages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_descriptor(dir: &Path, name: &str, json: &str) {
        let path = dir.join(format!("{name}.json"));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, json).unwrap();
    }

    fn minimal(name: &str) -> String {
        format!(
            r#"{{"package": "{name}", "version": "1.0", "type": "lib",
                "build": {{"env": [], "steps": []}}, "dependencies": []}}"#
        )
    }

    #[test]
    fn find_injects_bootstrap_into_regular_packages() {
        let dir = TempDir::new().unwrap();
        write_descriptor(dir.path(), "libfoo", &minimal("libfoo"));

        let store = PackageStore::new(dir.path());
        let pkg = store.find("libfoo").unwrap();

        for bootstrap in BOOTSTRAP_PACKAGES {
            assert!(pkg
                .dependencies
                .contains(&format!("all:{bootstrap}")));
        }
        assert!(pkg
            .build
            .steps
            .last()
            .unwrap()
            .contains("strip-nondeterminism-recursive"));
    }

    #[test]
    fn find_leaves_bootstrap_packages_alone() {
        let dir = TempDir::new().unwrap();
        write_descriptor(
            dir.path(),
            "native/bootstrap/make",
            &minimal("native/bootstrap/make"),
        );

        let store = PackageStore::new(dir.path());
        let pkg = store.find("native/bootstrap/make").unwrap();

        assert!(pkg.dependencies.is_empty());
        assert!(pkg.build.steps.is_empty());
    }

    #[test]
    fn find_rejects_name_mismatch() {
        let dir = TempDir::new().unwrap();
        write_descriptor(dir.path(), "libfoo", &minimal("libbar"));

        let store = PackageStore::new(dir.path());
        let err = store.find("libfoo").unwrap_err();
        assert!(matches!(err, Error::PackageNameMismatch { .. }));
    }

    #[test]
    fn find_reports_missing_package() {
        let dir = TempDir::new().unwrap();
        let store = PackageStore::new(dir.path());
        let err = store.find("no/such/package").unwrap_err();
        assert!(matches!(err, Error::PackageNotFound { .. }));
    }

    #[test]
    fn list_all_walks_nested_names_sorted() {
        let dir = TempDir::new().unwrap();
        write_descriptor(dir.path(), "zlib", &minimal("zlib"));
        write_descriptor(
            dir.path(),
            "native/bootstrap/make",
            &minimal("native/bootstrap/make"),
        );

        let store = PackageStore::new(dir.path());
        let all = store.list_all().unwrap();
        let names: Vec<_> = all.iter().map(|p| p.package.as_str()).collect();
        assert_eq!(names, vec!["native/bootstrap/make", "zlib"]);
    }

    #[test]
    fn host_dependencies_filters_by_triplet() {
        let pkg = PackageDescriptor {
            package: "libfoo".into(),
            version: "1.0".into(),
            kind: "lib".into(),
            download: DownloadSpec::default(),
            build: BuildSpec::default(),
            dependencies: vec![
                "all:zlib".into(),
                "aarch64-*:libneon".into(),
                "none:ghost".into(),
            ],
        };
        let deps = pkg.host_dependencies("aarch64-linux-gnu").unwrap();
        assert_eq!(deps, vec!["zlib", "libneon"]);

        let deps = pkg.host_dependencies("x86_64-linux-gnu").unwrap();
        assert_eq!(deps, vec!["zlib"]);
    }

    #[test]
    fn malformed_dependency_is_a_config_error() {
        let pkg = PackageDescriptor {
            package: "libfoo".into(),
            version: "1.0".into(),
            kind: "lib".into(),
            download: DownloadSpec::default(),
            build: BuildSpec::default(),
            dependencies: vec!["zlib".into()],
        };
        let err = pkg.host_dependencies("x86_64-linux-gnu").unwrap_err();
        assert!(matches!(err, Error::MalformedDependency { .. }));
    }
}
