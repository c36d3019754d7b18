//! Descriptor validation and dependency graph tests against a real store.

mod helpers;

use helpers::TestEnv;

use crossforge::error::Error;
use crossforge::graph::{self, CycleCheck};

#[test]
fn dependency_levels_bucket_by_distance() {
    let env = TestEnv::new();
    // app -> {liba, libb}, liba -> libc, libb -> libc. libc must appear
    // once, at distance 2.
    env.write_package("native/bootstrap/app", &[], &["all:native/bootstrap/liba", "all:native/bootstrap/libb"]);
    env.write_package("native/bootstrap/liba", &[], &["all:native/bootstrap/libc"]);
    env.write_package("native/bootstrap/libb", &[], &["all:native/bootstrap/libc"]);
    env.write_package("native/bootstrap/libc", &[], &[]);

    let levels =
        graph::dependency_levels(&env.store, "native/bootstrap/app", "x86_64-linux-gnu").unwrap();

    assert_eq!(levels.len(), 3);
    assert_eq!(levels[0], vec!["native/bootstrap/app".to_string()]);
    assert_eq!(
        {
            let mut level = levels[1].clone();
            level.sort();
            level
        },
        vec![
            "native/bootstrap/liba".to_string(),
            "native/bootstrap/libb".to_string()
        ]
    );
    assert_eq!(levels[2], vec!["native/bootstrap/libc".to_string()]);

    // No name appears in two levels.
    let mut seen = std::collections::HashSet::new();
    for level in &levels {
        for name in level {
            assert!(seen.insert(name.clone()), "{name} appeared twice");
        }
    }
}

#[test]
fn dependency_levels_requires_the_root_to_exist() {
    let env = TestEnv::new();
    let err = graph::dependency_levels(&env.store, "ghost", "x86_64-linux-gnu").unwrap_err();
    assert!(matches!(err, Error::PackageNotFound { .. }));
}

#[test]
fn cycle_detection_runs_over_the_loaded_descriptor_set() {
    let env = TestEnv::new();
    env.write_package("native/bootstrap/a", &[], &["all:native/bootstrap/b"]);
    env.write_package("native/bootstrap/b", &[], &["all:native/bootstrap/c"]);
    env.write_package("native/bootstrap/c", &[], &["all:native/bootstrap/a"]);

    let packages = env.store.list_all().unwrap();
    let CycleCheck::CycleFound(path) = graph::detect_cycles(&packages, "all").unwrap() else {
        panic!("cycle should be detected");
    };
    assert_eq!(path.first(), path.last());
    assert_eq!(path.len(), 4);
}

#[test]
fn bootstrap_injection_survives_list_all() {
    let env = TestEnv::new();
    env.write_bootstrap_packages();
    env.write_package("libzip", &[], &[]);

    let packages = env.store.list_all().unwrap();
    let libzip = packages.iter().find(|p| p.package == "libzip").unwrap();
    assert!(libzip
        .dependencies
        .iter()
        .any(|d| d == "all:native/bootstrap/make"));

    // The injected edges keep the world acyclic: bootstrap packages don't
    // depend back on anything.
    assert_eq!(
        graph::detect_cycles(&packages, "all").unwrap(),
        CycleCheck::Ok
    );
}

#[test]
fn malformed_step_entries_are_configuration_errors() {
    let env = TestEnv::new();
    env.write_package("native/bootstrap/make", &["missing-pattern-separator"], &[]);

    let pkg = env.store.find("native/bootstrap/make").unwrap();
    let err = pkg.step_entries().unwrap_err();
    assert!(matches!(err, Error::MalformedStep { .. }));
}
