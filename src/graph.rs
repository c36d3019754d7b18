//! Triplet-filtered dependency graph: cycle detection and level resolution.
//!
//! The adjacency view keeps only dependency edges whose pattern matches the
//! triplet under consideration (or `all`). Cycle detection runs per host and
//! once for the host-independent `all` view; a cycle anywhere is a
//! configuration error.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::Result;
use crate::package::{PackageDescriptor, PackageStore};

/// Outcome of a cycle check. Returned as a value so callers (CLI, tests)
/// decide how to react.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleCheck {
    Ok,
    /// The offending path in root-to-repeat order; the first and last
    /// element are the same node.
    CycleFound(Vec<String>),
}

/// Check all descriptors for dependency cycles under one triplet view.
///
/// Unknown dependency names are treated as leaves here; resolving them is a
/// separate validation concern.
pub fn detect_cycles(packages: &[PackageDescriptor], triplet: &str) -> Result<CycleCheck> {
    // BTreeMap keeps traversal order deterministic, so cycle reports are
    // stable run to run.
    let mut graph: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for pkg in packages {
        graph.insert(&pkg.package, pkg.host_dependencies(triplet)?);
    }

    let mut color: HashMap<&str, Color> = HashMap::new();
    let mut parent: HashMap<&str, &str> = HashMap::new();

    let names: Vec<&str> = graph.keys().copied().collect();
    for name in names {
        if color.get(name).copied().unwrap_or(Color::White) == Color::White {
            if let Some(cycle) = dfs(name, &graph, &mut color, &mut parent) {
                return Ok(CycleCheck::CycleFound(cycle));
            }
        }
    }
    Ok(CycleCheck::Ok)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

fn dfs<'a>(
    node: &'a str,
    graph: &BTreeMap<&'a str, Vec<String>>,
    color: &mut HashMap<&'a str, Color>,
    parent: &mut HashMap<&'a str, &'a str>,
) -> Option<Vec<String>> {
    color.insert(node, Color::Gray);

    for neighbor in graph.get(node).into_iter().flatten() {
        // Resolve the edge target back to a graph key; unknown names have
        // no outgoing edges and cannot close a cycle.
        let Some((&target, _)) = graph.get_key_value(neighbor.as_str()) else {
            continue;
        };

        match color.get(target).copied().unwrap_or(Color::White) {
            Color::Gray => {
                // Walk parent pointers from the current node back to the
                // revisited one, then reverse into root-to-repeat order.
                let mut cycle = vec![target.to_string()];
                let mut current = node;
                while current != target {
                    cycle.push(current.to_string());
                    current = parent[current];
                }
                cycle.push(target.to_string());
                cycle.reverse();
                return Some(cycle);
            }
            Color::White => {
                parent.insert(target, node);
                if let Some(cycle) = dfs(target, graph, color, parent) {
                    return Some(cycle);
                }
            }
            Color::Black => {}
        }
    }

    color.insert(node, Color::Black);
    None
}

/// Breadth-first dependency levels from a root package.
///
/// Level 0 is the root itself; each following level holds the names first
/// reached at that distance. A name never appears in two levels. Names that
/// fail to load mid-traversal are kept in their level but contribute no
/// further edges.
pub fn dependency_levels(
    store: &PackageStore,
    root: &str,
    triplet: &str,
) -> Result<Vec<Vec<String>>> {
    // The root must exist; anything deeper is reporting-only.
    let root_pkg = store.find(root)?;

    let mut levels = vec![vec![root_pkg.package.clone()]];
    let mut visited: HashSet<String> = HashSet::from([root_pkg.package.clone()]);
    let mut current = vec![root_pkg];

    while !current.is_empty() {
        let mut next_names = Vec::new();
        let mut next_pkgs = Vec::new();

        for pkg in &current {
            for dep in pkg.host_dependencies(triplet)? {
                if !visited.insert(dep.clone()) {
                    continue;
                }
                if let Ok(dep_pkg) = store.find(&dep) {
                    next_pkgs.push(dep_pkg);
                }
                next_names.push(dep);
            }
        }

        if next_names.is_empty() {
            break;
        }
        levels.push(next_names);
        current = next_pkgs;
    }

    Ok(levels)
}
