//! Configuration for crossforge.
//!
//! Reads configuration from environment variables (a `.env` file is loaded
//! by `main` before this runs). Everything falls back to working-directory
//! relative defaults, so a checkout with a `packages/` directory works with
//! no setup.

use std::env;
use std::path::{Path, PathBuf};

/// Environment variable overriding the data root.
pub const DATA_DIR_VAR: &str = "CROSSFORGE_DATA_DIR";
/// Environment variable overriding the package descriptor directory.
pub const PACKAGES_DIR_VAR: &str = "CROSSFORGE_PACKAGES_DIR";
/// Environment variable configuring an optional source mirror base URL.
pub const SOURCE_MIRROR_VAR: &str = "CROSSFORGE_SOURCE_MIRROR";

/// Crossforge configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root for all build state (default: `.crossforge/data`).
    pub data_root: PathBuf,
    /// Directory holding `<name>.json` package descriptors (default: `packages`).
    pub packages_dir: PathBuf,
    /// Directory holding per-package patches (default: `patches`).
    pub patches_dir: PathBuf,
    /// Optional mirror base URL tried before descriptor origin URLs.
    pub source_mirror: Option<String>,
    /// Identity of the machine doing the building, `<os>_<arch>`.
    pub builder: String,
}

impl Config {
    /// Load configuration from the environment, rooted at `base_dir`.
    pub fn load(base_dir: &Path) -> Self {
        let data_root = env::var(DATA_DIR_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| base_dir.join(".crossforge").join("data"));

        let packages_dir = env::var(PACKAGES_DIR_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| base_dir.join("packages"));

        let source_mirror = env::var(SOURCE_MIRROR_VAR)
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| s.trim_end_matches('/').to_string());

        Self {
            data_root,
            packages_dir,
            patches_dir: base_dir.join("patches"),
            source_mirror,
            builder: builder_id(),
        }
    }

    /// Per-builder state directory: `<data-root>/<builder>`.
    pub fn builder_dir(&self) -> PathBuf {
        self.data_root.join(&self.builder)
    }

    /// Built artifact root for a triplet.
    pub fn built_dir(&self, triplet: &str) -> PathBuf {
        self.builder_dir().join("built").join(triplet)
    }

    /// Ephemeral work root for a triplet.
    pub fn work_dir(&self, triplet: &str) -> PathBuf {
        self.builder_dir().join("work").join(triplet)
    }

    /// Ephemeral staging root for a triplet.
    pub fn staging_dir(&self, triplet: &str) -> PathBuf {
        self.builder_dir().join("staging").join(triplet)
    }

    /// Assembled dependency environment root for a triplet.
    ///
    /// Shared mutable state: one writer at a time (dependency extraction is
    /// serialized by the sequential build loop).
    pub fn env_root(&self, triplet: &str) -> PathBuf {
        self.builder_dir().join("env").join(triplet)
    }

    /// Source cache, shared across builders: `<data-root>/source`.
    pub fn source_dir(&self) -> PathBuf {
        self.data_root.join("source")
    }

    /// Patch directory for one package.
    pub fn patch_dir(&self, package: &str) -> PathBuf {
        self.patches_dir.join(package)
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  builder:      {}", self.builder);
        println!("  data root:    {}", self.data_root.display());
        println!("  packages dir: {}", self.packages_dir.display());
        println!("  patches dir:  {}", self.patches_dir.display());
        match &self.source_mirror {
            Some(url) => println!("  mirror:       {url}"),
            None => println!("  mirror:       (none)"),
        }
    }
}

/// Builder identity for partitioning the data root, `<os>_<arch>`.
pub fn builder_id() -> String {
    format!("{}_{}", env::consts::OS, env::consts::ARCH)
}
