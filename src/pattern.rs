//! Pattern-qualified entries.
//!
//! Dependency, build-step and env entries all share one wire form:
//! `pattern:payload`, where the pattern is `all`, `none`, or a glob matched
//! against the host triplet. Entries are parsed once into explicit records
//! here instead of being re-split at every use site.

use glob::Pattern;

/// A parsed `pattern:payload` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// `all`, `none`, or a glob over a triplet (e.g. `aarch64-*`).
    pub pattern: String,
    /// Everything after the first `:`.
    pub payload: String,
}

impl Entry {
    /// Split an entry at the first `:`. Returns None if there is no `:`.
    pub fn parse(raw: &str) -> Option<Entry> {
        let (pattern, payload) = raw.split_once(':')?;
        Some(Entry {
            pattern: pattern.to_string(),
            payload: payload.to_string(),
        })
    }

    /// Whether this entry applies to the given triplet.
    pub fn matches(&self, triplet: &str) -> bool {
        matches_triplet(&self.pattern, triplet)
    }
}

/// Match a pattern against a triplet.
///
/// `all` matches every triplet (including the host-independent `all` view);
/// `none` matches nothing. Anything else is a glob.
pub fn matches_triplet(pattern: &str, triplet: &str) -> bool {
    if pattern == "all" {
        return true;
    }
    if pattern == "none" {
        return false;
    }
    match Pattern::new(pattern) {
        Ok(p) => p.matches(triplet),
        // An unparseable glob only matches itself.
        Err(_) => pattern == triplet,
    }
}
