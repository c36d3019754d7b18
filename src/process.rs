//! Centralized command execution with consistent error handling.
//!
//! All external commands go through the `Cmd` builder, which captures stderr
//! and turns non-zero exits into useful error messages. Build steps go
//! through the `StepRunner` trait so tests can substitute an in-memory
//! runner and assert on failure handling without spawning shells.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use crate::envcomp::EnvMap;
use crate::error::Result;

/// Result of a captured command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit code, or -1 if terminated by signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

/// Builder for configuring command execution.
pub struct Cmd {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    /// If true, don't fail on non-zero exit.
    allow_fail: bool,
}

impl Cmd {
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            current_dir: None,
            allow_fail: false,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.args.push(arg.as_ref().to_string());
        }
        self
    }

    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    pub fn dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Allow non-zero exit codes without failing.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Run the command and capture output.
    pub fn run(self) -> std::io::Result<CommandResult> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }

        let output = cmd.output()?;
        let result = CommandResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !self.allow_fail && !result.success() {
            let stderr = result.stderr_trimmed();
            let msg = if stderr.is_empty() {
                format!("'{}' failed (exit code {})", self.program, result.code())
            } else {
                format!(
                    "'{}' failed (exit code {}):\n{}",
                    self.program,
                    result.code(),
                    stderr
                )
            };
            return Err(std::io::Error::other(msg));
        }

        Ok(result)
    }

    /// Run the command with inherited stdio (streaming output).
    ///
    /// Use for long-running commands where the user should see progress
    /// (clones, build steps).
    pub fn run_interactive(self) -> std::io::Result<ExitStatus> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdin(Stdio::inherit());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());
        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }

        let status = cmd.status()?;
        if !self.allow_fail && !status.success() {
            return Err(std::io::Error::other(format!(
                "'{}' failed (exit code {})",
                self.program,
                status.code().unwrap_or(-1)
            )));
        }
        Ok(status)
    }
}

/// Capture the trimmed stdout of a shell command, or None on any failure.
///
/// Used to resolve toolchain paths at host-catalog construction.
pub fn shell_capture(command: &str) -> Option<String> {
    let result = Cmd::new("bash")
        .args(["-c", command])
        .allow_fail()
        .run()
        .ok()?;
    if !result.success() {
        return None;
    }
    Some(result.stdout_trimmed().to_string())
}

/// Executes build steps.
///
/// A step is one opaque shell command, run in a working directory with an
/// explicit environment (nothing inherited).
pub trait StepRunner {
    /// Run `command` and return its exit code.
    fn run(&self, command: &str, cwd: &Path, env: &EnvMap) -> Result<i32>;
}

/// Production runner: `sh -c`, inherited stdio so step output streams to
/// the terminal.
pub struct ShellRunner;

impl StepRunner for ShellRunner {
    fn run(&self, command: &str, cwd: &Path, env: &EnvMap) -> Result<i32> {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd.current_dir(cwd);
        cmd.env_clear();
        cmd.envs(env);
        cmd.stdin(Stdio::inherit());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());

        let status = cmd.status()?;
        Ok(status.code().unwrap_or(-1))
    }
}
