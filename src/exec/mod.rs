//! External process execution.
//!
//! Every version-control operation ends up here as an [`Invocation`]. The
//! [`CommandRunner`] trait is the seam where tests attach
//! [`mock::ScriptedRunner`] instead of spawning real processes.

pub mod mock;

pub use mock::ScriptedRunner;

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use tracing::{debug, info};

use crate::error::{ReleaseError, Result};

/// One process to run: program, arguments and working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Whether running this changes repository state
    pub mutates: bool,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Invocation {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            mutates: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn mutating(mut self) -> Self {
        self.mutates = true;
        self
    }

    /// Program and arguments joined with spaces, for logs and error messages
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                line.push_str(&format!("{:?}", arg));
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Captured result of a finished process.
///
/// Lines are trimmed and empty lines dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl CommandOutput {
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandOutput {
            code: Some(0),
            stdout: lines.into_iter().map(Into::into).collect(),
            stderr: Vec::new(),
        }
    }

    /// First stdout line, or an empty string
    pub fn first_line(&self) -> &str {
        self.stdout.first().map(|s| s.as_str()).unwrap_or_default()
    }
}

pub trait CommandRunner: Send + Sync {
    /// Run the invocation to completion.
    ///
    /// A non-zero exit or a spawn failure is a
    /// [`ReleaseError::BackendOperationFailed`] carrying stderr.
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;

    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Runs invocations as child processes.
///
/// In dry-run mode mutating invocations are logged and reported as
/// successful without being spawned; read-only ones still run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner {
    dry_run: bool,
}

impl SystemRunner {
    pub fn new(dry_run: bool) -> Self {
        SystemRunner { dry_run }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let command = invocation.command_line();
        if self.dry_run && invocation.mutates {
            info!(%command, "dry run, not executing");
            return Ok(CommandOutput {
                code: Some(0),
                ..CommandOutput::default()
            });
        }
        debug!(%command, cwd = ?invocation.cwd, "exec");

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &invocation.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| ReleaseError::BackendOperationFailed {
            command: command.clone(),
            code: None,
            stderr: e.to_string(),
        })?;

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let (stdout, stderr) = thread::scope(|scope| {
            let out = scope.spawn(move || drain(stdout_pipe));
            let err = scope.spawn(move || drain(stderr_pipe));
            (join_reader(out), join_reader(err))
        });
        let stdout = stdout?;
        let stderr = stderr?;

        let status = child.wait()?;
        if !status.success() {
            // git reports merge conflicts on stdout
            let detail = if stderr.is_empty() { &stdout } else { &stderr };
            return Err(ReleaseError::BackendOperationFailed {
                command,
                code: status.code(),
                stderr: detail.join("\n"),
            });
        }

        Ok(CommandOutput {
            code: status.code(),
            stdout,
            stderr,
        })
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

fn drain<R: Read>(pipe: Option<R>) -> std::io::Result<Vec<String>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf)?;
    }
    Ok(split_lines(&String::from_utf8_lossy(&buf)))
}

fn join_reader(
    handle: thread::ScopedJoinHandle<'_, std::io::Result<Vec<String>>>,
) -> Result<Vec<String>> {
    match handle.join() {
        Ok(lines) => Ok(lines?),
        Err(_) => Err(ReleaseError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "output reader panicked",
        ))),
    }
}

/// Trimmed, non-empty lines of `text`
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
