//! Source fetching: checksum-verified downloads and pinned git clones.
//!
//! Archives are written to the source cache while a SHA256 runs over the
//! same byte stream, so verification never re-reads the file. A configured
//! mirror is tried first with the same checksum; any mirror failure degrades
//! to a warning and the origin URL is used. Git sources are cloned, pinned
//! to the requested reference, and stripped of remotes and stale branches.
//!
//! An artifact already present at its expected path is trusted: the path is
//! content-addressed by construction.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::package::PackageDescriptor;
use crate::process::Cmd;

/// Timeout for establishing HTTP connections.
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Buffer size for streaming downloads.
const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// Downloads and verifies package sources into the source cache.
pub struct SourceFetcher<'a> {
    config: &'a Config,
}

impl<'a> SourceFetcher<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Cache location for a package's source artifact.
    ///
    /// Archives: `<source>/<name>-<version>.<kind>`. Git clones get a
    /// reference prefix so repinning a descriptor addresses a fresh clone:
    /// `<source>/<name>-<version>-<ref8>.git`.
    pub fn source_path(&self, pkg: &PackageDescriptor) -> PathBuf {
        let kind = pkg.download.kind.as_str();
        let base = format!("{}-{}", pkg.package, pkg.version);
        let file = if kind == "git" {
            format!("{base}-{}.git", ref_prefix(&pkg.download.sha256))
        } else {
            format!("{base}.{kind}")
        };
        self.config.source_dir().join(file)
    }

    /// Obtain the package's source, downloading and verifying if needed.
    ///
    /// `none` sources are a no-op. Anything already on disk at the expected
    /// path is trusted without re-verification.
    pub fn fetch(&self, pkg: &PackageDescriptor) -> Result<()> {
        if pkg.download.kind == "none" {
            return Ok(());
        }

        let dest = self.source_path(pkg);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        if dest.exists() {
            log::debug!("source already cached: {}", dest.display());
            return Ok(());
        }

        if pkg.download.kind == "git" {
            download_git(&dest, &pkg.download.url, &pkg.download.sha256)
        } else {
            self.download_verified(&dest, &pkg.download.url, &pkg.download.sha256)
        }
    }

    /// Download to `dest`, preferring the configured mirror.
    fn download_verified(&self, dest: &Path, url: &str, sha256: &str) -> Result<()> {
        if let Some(mirror) = &self.config.source_mirror {
            let basename = dest
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mirror_url = format!("{mirror}/{basename}");
            match download_file(dest, &mirror_url, sha256) {
                Ok(()) => {
                    log::info!("downloaded from mirror: {}", dest.display());
                    return Ok(());
                }
                Err(e) => {
                    log::warn!("mirror download failed ({e}), trying origin URL");
                }
            }
        }
        download_file(dest, url, sha256)
    }
}

fn ref_prefix(reference: &str) -> String {
    let sanitized: String = reference
        .chars()
        .map(|c| if c == '/' { '_' } else { c })
        .collect();
    sanitized.chars().take(8).collect()
}

/// Download `url` to `path`, hashing the stream as it is written.
///
/// On checksum mismatch the partial file is deleted so a later run cannot
/// mistake it for a valid cached source.
pub fn download_file(path: &Path, url: &str, expected_sha256: &str) -> Result<()> {
    log::info!("downloading {url} to {}", path.display());

    let client = reqwest::blocking::Client::builder()
        .connect_timeout(HTTP_CONNECT_TIMEOUT)
        .build()
        .map_err(|e| Error::Download {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let mut response = client.get(url).send().map_err(|e| Error::Download {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    if !response.status().is_success() {
        return Err(Error::Download {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let mut out = File::create(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; STREAM_BUFFER_SIZE];
    loop {
        let n = response.read(&mut buffer).map_err(|e| {
            let _ = fs::remove_file(path);
            Error::Download {
                url: url.to_string(),
                reason: format!("read failed: {e}"),
            }
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        out.write_all(&buffer[..n])?;
    }
    out.flush()?;
    drop(out);

    let actual = format!("{:x}", hasher.finalize());
    if actual != expected_sha256 {
        fs::remove_file(path)?;
        return Err(Error::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected_sha256.to_string(),
            actual,
        });
    }

    log::info!("downloaded and verified {}", path.display());
    Ok(())
}

/// Clone `url` into `dest` and pin it to `reference`.
pub fn download_git(dest: &Path, url: &str, reference: &str) -> Result<()> {
    if which::which("git").is_err() {
        return Err(Error::Download {
            url: url.to_string(),
            reason: "git is not installed".to_string(),
        });
    }

    log::info!("cloning {url} to {}", dest.display());
    Cmd::new("git")
        .arg("clone")
        .arg(url)
        .arg_path(dest)
        .run_interactive()
        .map_err(|e| Error::Download {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    log::info!("checking out reference {reference}");
    let commit = resolve_ref(dest, reference).ok_or_else(|| Error::Download {
        url: url.to_string(),
        reason: format!("cannot resolve reference {reference:?}"),
    })?;

    Cmd::new("git")
        .args(["checkout", "--detach"])
        .arg(&commit)
        .dir(dest)
        .run_interactive()
        .map_err(|e| Error::Download {
            url: url.to_string(),
            reason: format!("checkout of {commit} failed: {e}"),
        })?;

    prune_clone(dest);
    Ok(())
}

/// Resolve a pinned reference to a commit hash.
///
/// Tried in order: exact 40-character commit hash, tag, local branch,
/// remote-tracking branch under origin, raw reference path.
fn resolve_ref(repo: &Path, reference: &str) -> Option<String> {
    if reference.len() == 40 && reference.chars().all(|c| c.is_ascii_hexdigit()) {
        if rev_parse(repo, &format!("{reference}^{{commit}}")).is_some() {
            return Some(reference.to_string());
        }
    }

    for candidate in [
        format!("refs/tags/{reference}"),
        format!("refs/heads/{reference}"),
        format!("refs/remotes/origin/{reference}"),
        reference.to_string(),
    ] {
        if let Some(hash) = rev_parse(repo, &format!("{candidate}^{{commit}}")) {
            return Some(hash);
        }
    }
    None
}

fn rev_parse(repo: &Path, spec: &str) -> Option<String> {
    let result = Cmd::new("git")
        .args(["rev-parse", "--verify", "--quiet"])
        .arg(spec)
        .dir(repo)
        .allow_fail()
        .run()
        .ok()?;
    if !result.success() || result.stdout_trimmed().is_empty() {
        return None;
    }
    Some(result.stdout_trimmed().to_string())
}

/// Drop remotes and branches not pointing at HEAD to shrink the clone.
/// Failures here only cost disk space, so they are warnings.
fn prune_clone(repo: &Path) {
    log::info!("optimizing clone at {}", repo.display());

    if let Ok(result) = Cmd::new("git").arg("remote").dir(repo).allow_fail().run() {
        for remote in result.stdout.lines().map(str::trim).filter(|r| !r.is_empty()) {
            let removed = Cmd::new("git")
                .args(["remote", "remove"])
                .arg(remote)
                .dir(repo)
                .allow_fail()
                .run();
            if !matches!(removed, Ok(r) if r.success()) {
                log::warn!("failed to remove remote {remote} in {}", repo.display());
            }
        }
    }

    let Some(head) = rev_parse(repo, "HEAD") else {
        return;
    };
    let Ok(branches) = Cmd::new("git")
        .args([
            "for-each-ref",
            "refs/heads",
            "--format=%(refname:short) %(objectname)",
        ])
        .dir(repo)
        .allow_fail()
        .run()
    else {
        return;
    };

    for line in branches.stdout.lines() {
        let Some((name, hash)) = line.trim().split_once(' ') else {
            continue;
        };
        if hash == head {
            continue;
        }
        let deleted = Cmd::new("git")
            .args(["branch", "-D"])
            .arg(name)
            .dir(repo)
            .allow_fail()
            .run();
        if !matches!(deleted, Ok(r) if r.success()) {
            log::warn!("failed to remove branch {name} in {}", repo.display());
        }
    }
}
