//! Error taxonomy for the build core.
//!
//! Configuration errors carry enough context (package name, offending entry,
//! cycle path) to fix the descriptor that caused them. Nothing here is
//! retried; command handlers wrap these in `anyhow` for display.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("package {package}: invalid env entry {entry:?} (expected pattern:KEY=VALUE)")]
    MalformedEnvEntry { package: String, entry: String },

    #[error("package {package}: invalid build step {entry:?} (expected pattern:command)")]
    MalformedStep { package: String, entry: String },

    #[error("package {package}: invalid dependency {entry:?} (expected pattern:name)")]
    MalformedDependency { package: String, entry: String },

    #[error("package {name} not found at {path}")]
    PackageNotFound { name: String, path: PathBuf },

    #[error("descriptor at {path} declares package {declared:?}, expected {expected:?}")]
    PackageNameMismatch {
        path: PathBuf,
        declared: String,
        expected: String,
    },

    #[error("cyclic dependency for host {triplet}: {}", path.join(" -> "))]
    CyclicDependency { triplet: String, path: Vec<String> },

    #[error("failed to download {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("archive {path}: {reason}")]
    Archive { path: PathBuf, reason: String },

    #[error("unsupported download kind {kind:?} for package {package}")]
    UnsupportedKind { package: String, kind: String },

    #[error("package {package}: step failed with exit code {code}: {step} (in {dir})")]
    StepFailed {
        package: String,
        step: String,
        code: i32,
        dir: PathBuf,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
