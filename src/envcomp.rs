//! Layered build environment composition.
//!
//! An environment is composed from ordered layers of `pattern:KEY=VALUE`
//! entries: the builder's global layer, then (for non-native packages) the
//! host layer, then the package-declared layer. Native packages build for
//! the machine itself, so the host layer is skipped. Within one composition
//! pass later entries overwrite earlier ones, and `$VAR` references resolve
//! against variables assigned so far in the same pass.
//!
//! The same composition feeds both step execution and fingerprinting (the
//! fingerprint caller removes `PATH` afterwards), so this must stay a pure
//! function of its inputs.

use std::collections::BTreeMap;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::host::{self, Host};
use crate::package::PackageDescriptor;
use crate::pattern::Entry;

/// Composed environment mapping. Ordered so serialization is canonical.
pub type EnvMap = BTreeMap<String, String>;

/// Expand `$VAR` and `${VAR}` references against `env`.
///
/// Unknown variables expand to the empty string; a `$` not followed by a
/// variable name is kept literally.
pub fn expand(s: &str, env: &EnvMap) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some(&(start, '{')) => {
                chars.next();
                let rest = &s[start + 1..];
                match rest.find('}') {
                    Some(end) => {
                        let name = &rest[..end];
                        if let Some(v) = env.get(name) {
                            out.push_str(v);
                        }
                        // Consume the name and the closing brace.
                        for _ in 0..name.chars().count() + 1 {
                            chars.next();
                        }
                    }
                    // Unterminated brace: keep literally.
                    None => out.push_str("${"),
                }
            }
            Some(&(start, c2)) if c2 == '_' || c2.is_ascii_alphabetic() => {
                let rest = &s[start..];
                let end = rest
                    .find(|ch: char| ch != '_' && !ch.is_ascii_alphanumeric())
                    .unwrap_or(rest.len());
                let name = &rest[..end];
                if let Some(v) = env.get(name) {
                    out.push_str(v);
                }
                for _ in 0..name.len() {
                    chars.next();
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Apply one layer of entries on top of `env`.
///
/// Each entry is split at the first `:` (pattern) and the first `=`
/// (key/value), its payload expanded against the variables assigned so far,
/// and applied when the pattern is `all` or glob-matches `triplet`.
/// Malformed entries fail even when their pattern doesn't match.
pub fn apply_layer(
    env: &mut EnvMap,
    layer: &[String],
    triplet: &str,
    package: &str,
) -> Result<()> {
    for raw in layer {
        let malformed = || Error::MalformedEnvEntry {
            package: package.to_string(),
            entry: raw.clone(),
        };
        let entry = Entry::parse(raw).ok_or_else(malformed)?;
        let expanded = expand(&entry.payload, env);
        let (key, value) = expanded.split_once('=').ok_or_else(malformed)?;
        if !entry.matches(triplet) {
            continue;
        }
        env.insert(key.to_string(), value.to_string());
    }
    Ok(())
}

/// Seed keys whose values depend on the machine or the working directory
/// (CPU count, absolute paths under the data root). Fingerprinting removes
/// them so the digest stays stable across machines and checkouts.
pub const VOLATILE_KEYS: &[&str] = &["PATH", "NUM_CORES", "PATCH_DIR", "PREFIX", "HOST_PREFIX"];

/// Compose the full environment for building `pkg` on `host`.
///
/// The seed carries the host-derived defaults; native packages skip the
/// host layer and see only the builder and package layers.
pub fn package_env(config: &Config, host: &Host, pkg: &PackageDescriptor) -> Result<EnvMap> {
    let env_root = config.env_root(&host.triplet);
    let env_root = env_root.to_string_lossy();

    let mut env = EnvMap::new();
    env.insert(
        "PATH".to_string(),
        format!(
            "{env_root}/native/bin:{}",
            std::env::var("PATH").unwrap_or_default()
        ),
    );
    env.insert("HOST".to_string(), host.triplet.clone());
    env.insert("PREFIX".to_string(), env_root.to_string());
    env.insert("HOST_PREFIX".to_string(), env_root.to_string());
    env.insert("NUM_CORES".to_string(), num_cores().to_string());
    env.insert(
        "PATCH_DIR".to_string(),
        config.patch_dir(&pkg.package).to_string_lossy().into_owned(),
    );

    apply_layer(&mut env, &host::builder_env(), &host.triplet, &pkg.package)?;

    if !pkg.is_native() {
        apply_layer(&mut env, &host.env, &host.triplet, &pkg.package)?;
    }

    apply_layer(&mut env, &pkg.build.env, &host.triplet, &pkg.package)?;
    Ok(env)
}

fn num_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
