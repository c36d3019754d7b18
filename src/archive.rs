//! Tar archive extraction and reproducible creation.
//!
//! Extraction makes two passes over the archive: the first detects whether
//! every entry lives under a single top-level directory (the usual
//! `name-version/` layout of release tarballs), the second extracts with
//! that prefix stripped. Re-reading the archive keeps memory flat and works
//! with non-seekable decompressor streams.
//!
//! Creation sorts entries and pins every timestamp, so archiving the same
//! tree twice yields byte-identical output.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read};
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

use filetime::FileTime;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tar::EntryType;
use xz2::read::XzDecoder;

use crate::error::{Error, Result};

/// Timestamp stamped on every created archive entry.
const FIXED_EPOCH: u64 = 1;

/// Compression wrapping a tar stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gz,
    Bz2,
    Xz,
}

impl Compression {
    /// Map a descriptor download kind to its compression.
    pub fn from_kind(kind: &str) -> Option<Compression> {
        match kind {
            "tar.gz" => Some(Compression::Gz),
            "tar.bz2" => Some(Compression::Bz2),
            "tar.xz" => Some(Compression::Xz),
            _ => None,
        }
    }
}

fn open_tar(path: &Path, compression: Compression) -> Result<tar::Archive<Box<dyn Read>>> {
    let file = File::open(path).map_err(|e| Error::Archive {
        path: path.to_path_buf(),
        reason: format!("cannot open: {e}"),
    })?;
    let file = BufReader::new(file);
    let reader: Box<dyn Read> = match compression {
        Compression::Gz => Box::new(GzDecoder::new(file)),
        Compression::Bz2 => Box::new(bzip2::read::BzDecoder::new(file)),
        Compression::Xz => Box::new(XzDecoder::new(file)),
    };
    Ok(tar::Archive::new(reader))
}

/// Detect a sole top-level directory shared by every entry.
///
/// Returns `Some("dir/")` when exactly one first-level directory exists and
/// no regular files sit at the archive root.
fn detect_common_prefix(path: &Path, compression: Compression) -> Result<Option<String>> {
    let mut archive = open_tar(path, compression)?;
    let mut first_level_dirs: BTreeMap<String, usize> = BTreeMap::new();
    let mut root_files = 0usize;

    for entry in archive.entries().map_err(|e| read_error(path, e))? {
        let entry = entry.map_err(|e| read_error(path, e))?;
        let raw = entry.path_bytes();
        let name = String::from_utf8_lossy(&raw).into_owned();
        let name = name.trim_end_matches('/');
        if name == "pax_global_header" || name == "." || name.is_empty() {
            continue;
        }

        match name.split_once('/') {
            Some((first, _)) => {
                *first_level_dirs.entry(first.to_string()).or_default() += 1;
            }
            None => {
                if entry.header().entry_type() != EntryType::Directory {
                    root_files += 1;
                } else {
                    *first_level_dirs.entry(name.to_string()).or_default() += 1;
                }
            }
        }
    }

    if first_level_dirs.len() == 1 && root_files == 0 {
        let dir = first_level_dirs.into_keys().next().unwrap();
        return Ok(Some(format!("{dir}/")));
    }
    Ok(None)
}

fn read_error(path: &Path, e: io::Error) -> Error {
    Error::Archive {
        path: path.to_path_buf(),
        reason: format!("read failed: {e}"),
    }
}

/// Relative path of an entry under the destination, or None when the entry
/// must be skipped (escapes the destination root).
fn safe_relative(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(c) => clean.push(c),
            Component::CurDir => {}
            // `..` or absolute entries could land outside the destination.
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if clean.as_os_str().is_empty() {
        None
    } else {
        Some(clean)
    }
}

fn restore_times(target: &Path, mtime: u64) {
    let time = FileTime::from_unix_time(mtime as i64, 0);
    if let Err(e) = filetime::set_symlink_file_times(target, time, time) {
        log::warn!("failed to set timestamps for {}: {e}", target.display());
    }
}

/// Extract `archive` into `dest`, stripping a detected common prefix.
///
/// Entries that would escape `dest` are skipped with a warning. Directory
/// modes are widened to be traversable; setuid/setgid/sticky bits are
/// dropped from files; symlinks are recreated verbatim.
pub fn extract(archive: &Path, dest: &Path, compression: Compression) -> Result<()> {
    if !archive.exists() {
        return Err(Error::Archive {
            path: archive.to_path_buf(),
            reason: "archive not found".to_string(),
        });
    }

    log::info!("extracting {} into {}", archive.display(), dest.display());

    let common_prefix = detect_common_prefix(archive, compression)?;
    let mut tar = open_tar(archive, compression)?;

    for entry in tar.entries().map_err(|e| read_error(archive, e))? {
        let mut entry = entry.map_err(|e| read_error(archive, e))?;
        let raw = entry.path_bytes();
        let mut name = String::from_utf8_lossy(&raw).into_owned();
        if let Some(prefix) = &common_prefix {
            if let Some(stripped) = name.strip_prefix(prefix.as_str()) {
                name = stripped.to_string();
            }
        }
        if name.is_empty() || name == "pax_global_header" {
            continue;
        }

        let Some(rel) = safe_relative(&name) else {
            log::warn!("skipping entry outside destination: {name}");
            continue;
        };
        let target = dest.join(rel);
        let mtime = entry.header().mtime().unwrap_or(0);
        let mode = entry.header().mode().unwrap_or(0) & 0o777;

        match entry.header().entry_type() {
            EntryType::Directory => {
                let mut dir_mode = if mode == 0 { 0o755 } else { mode };
                if dir_mode & 0o111 == 0 {
                    // Without traversal bits nothing below is reachable.
                    dir_mode |= 0o755;
                }
                fs::create_dir_all(&target)?;
                fs::set_permissions(&target, fs::Permissions::from_mode(dir_mode))?;
                restore_times(&target, mtime);
            }
            EntryType::Regular => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let file_mode = if mode == 0 { 0o644 } else { mode };
                let _ = fs::remove_file(&target);
                let mut out = File::create(&target)?;
                io::copy(&mut entry, &mut out)?;
                fs::set_permissions(&target, fs::Permissions::from_mode(file_mode))?;
                restore_times(&target, mtime);
            }
            EntryType::Symlink => {
                let Ok(Some(link)) = entry.link_name() else {
                    log::warn!("symlink entry without target: {name}");
                    continue;
                };
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let _ = fs::remove_file(&target);
                if let Err(e) = std::os::unix::fs::symlink(&link, &target) {
                    log::warn!(
                        "failed to create symlink {} -> {}: {e}",
                        target.display(),
                        link.display()
                    );
                } else {
                    restore_times(&target, mtime);
                }
            }
            // Hard links, fifos, devices don't occur in source/build
            // archives; ignore them like unknown extensions.
            _ => {}
        }
    }

    if let Some(prefix) = common_prefix {
        log::info!("stripped common directory prefix: {prefix}");
    }
    Ok(())
}

/// Create `archive` (tar + gzip) from the contents of `source_dir`.
///
/// Entry order is the sorted relative path list, never filesystem order,
/// and every timestamp is pinned, so identical content produces identical
/// bytes no matter when or where the archive is written.
pub fn create_reproducible(source_dir: &Path, archive: &Path) -> Result<()> {
    log::info!(
        "creating archive {} from {}",
        archive.display(),
        source_dir.display()
    );

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in walkdir::WalkDir::new(source_dir).min_depth(1) {
        let entry = entry.map_err(|e| Error::Archive {
            path: source_dir.to_path_buf(),
            reason: format!("walk failed: {e}"),
        })?;
        paths.push(entry.path().to_path_buf());
    }
    paths.sort();

    let out = File::create(archive)?;
    let encoder = GzEncoder::new(BufWriter::new(out), flate2::Compression::best());
    let mut builder = tar::Builder::new(encoder);

    for path in &paths {
        let meta = fs::symlink_metadata(path)?;
        let rel = path
            .strip_prefix(source_dir)
            .expect("walked path is under source dir");

        let mut header = tar::Header::new_gnu();
        header.set_mtime(FIXED_EPOCH);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mode(meta.permissions().mode() & 0o777);

        if meta.file_type().is_symlink() {
            let link = fs::read_link(path)?;
            header.set_entry_type(EntryType::Symlink);
            header.set_size(0);
            builder.append_link(&mut header, rel, &link)?;
        } else if meta.is_dir() {
            header.set_entry_type(EntryType::Directory);
            header.set_size(0);
            builder.append_data(&mut header, rel, io::empty())?;
        } else {
            header.set_entry_type(EntryType::Regular);
            header.set_size(meta.len());
            let file = File::open(path)?;
            builder.append_data(&mut header, rel, file)?;
        }
    }

    let encoder = builder.into_inner()?;
    encoder.finish()?.into_inner().map_err(|e| Error::Archive {
        path: archive.to_path_buf(),
        reason: format!("flush failed: {e}"),
    })?;
    Ok(())
}
