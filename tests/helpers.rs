//! Shared test utilities for crossforge tests.

use std::cell::RefCell;
use std::fs;
use std::path::Path;

use tempfile::TempDir;

use crossforge::config::Config;
use crossforge::envcomp::EnvMap;
use crossforge::error::Result;
use crossforge::host::HostCatalog;
use crossforge::package::{PackageStore, BOOTSTRAP_PACKAGES};
use crossforge::process::StepRunner;

/// Test environment with a temporary descriptor directory and data root.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    pub config: Config,
    pub store: PackageStore,
    pub catalog: HostCatalog,
}

impl TestEnv {
    /// Create a new test environment with empty packages and data dirs.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path();

        let packages_dir = base.join("packages");
        fs::create_dir_all(&packages_dir).expect("Failed to create packages dir");

        let config = Config {
            data_root: base.join("data"),
            packages_dir: packages_dir.clone(),
            patches_dir: base.join("patches"),
            source_mirror: None,
            builder: "test_builder".to_string(),
        };

        Self {
            _temp_dir: temp_dir,
            config,
            store: PackageStore::new(packages_dir),
            catalog: HostCatalog::new(),
        }
    }

    /// Write a descriptor file under the packages dir.
    pub fn write_descriptor(&self, name: &str, json: &str) {
        let path = self.config.packages_dir.join(format!("{name}.json"));
        fs::create_dir_all(path.parent().unwrap()).expect("Failed to create descriptor dir");
        fs::write(path, json).expect("Failed to write descriptor");
    }

    /// Write a minimal descriptor with the given steps and dependencies.
    pub fn write_package(&self, name: &str, steps: &[&str], dependencies: &[&str]) {
        let steps_json: Vec<String> = steps.iter().map(|s| format!("{s:?}")).collect();
        let deps_json: Vec<String> = dependencies.iter().map(|d| format!("{d:?}")).collect();
        self.write_descriptor(
            name,
            &format!(
                r#"{{"package": {name:?}, "version": "1.0", "type": "lib",
                    "download": {{"kind": "none", "url": "", "sha256": ""}},
                    "build": {{"env": [], "steps": [{}]}},
                    "dependencies": [{}]}}"#,
                steps_json.join(", "),
                deps_json.join(", "),
            ),
        );
    }

    /// Create the full bootstrap package set.
    ///
    /// `strip-nondeterminism` installs a no-op stub of the normalization
    /// tool so the step injected into regular packages succeeds.
    pub fn write_bootstrap_packages(&self) {
        for name in BOOTSTRAP_PACKAGES {
            if name.ends_with("strip-nondeterminism") {
                self.write_package(
                    name,
                    &[concat!(
                        "all:mkdir -p $STAGING_DIR$PREFIX/native/bootstrap/bin && ",
                        "printf '#!/bin/sh\\nexit 0\\n' ",
                        "> $STAGING_DIR$PREFIX/native/bootstrap/bin/strip-nondeterminism-recursive && ",
                        "chmod +x $STAGING_DIR$PREFIX/native/bootstrap/bin/strip-nondeterminism-recursive"
                    )],
                    &[],
                );
            } else {
                self.write_package(name, &[], &[]);
            }
        }
    }
}

/// Step runner that records commands and environments instead of spawning
/// shells.
pub struct RecordingRunner {
    pub commands: RefCell<Vec<String>>,
    pub envs: RefCell<Vec<EnvMap>>,
    /// Exit code returned for every step.
    pub exit_code: i32,
}

impl RecordingRunner {
    pub fn succeeding() -> Self {
        Self {
            commands: RefCell::new(Vec::new()),
            envs: RefCell::new(Vec::new()),
            exit_code: 0,
        }
    }

    pub fn failing(code: i32) -> Self {
        Self {
            commands: RefCell::new(Vec::new()),
            envs: RefCell::new(Vec::new()),
            exit_code: code,
        }
    }

    pub fn recorded(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }
}

impl StepRunner for RecordingRunner {
    fn run(&self, command: &str, _cwd: &Path, env: &EnvMap) -> Result<i32> {
        self.commands.borrow_mut().push(command.to_string());
        self.envs.borrow_mut().push(env.clone());
        Ok(self.exit_code)
    }
}
