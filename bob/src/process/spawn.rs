//! Command descriptions and process launching.
//!
//! A [`Command`] is an argv vector plus the directory to run it from. Launching
//! it connects the child's stdout and stderr to a pseudo-terminal, so tools
//! that check `isatty` keep their interactive, line-buffered output.

use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{self, Stdio};
use std::thread;

use nix::errno::Errno;
use tracing::{info, warn};

use super::capture::OutputCapture;
use super::handle::{ProcessHandle, POLL_INTERVAL};
use super::pty;
use crate::error::{Result, RunnerError};

const DEFAULT_ROOT: &str = ".";

/// A process invocation: program, arguments and working directory.
#[derive(Debug, Clone)]
pub struct Command {
    /// Program followed by its arguments.
    parts: Vec<String>,

    /// Directory the child starts in.
    root: PathBuf,

    /// Whether output read while polling is kept in [`Command::output`].
    pub capture_output: bool,

    /// Whether output is kept off the console while the command runs.
    pub silent: bool,

    output: OutputCapture,
}

impl Default for Command {
    fn default() -> Self {
        Self {
            parts: Vec::new(),
            root: PathBuf::from(DEFAULT_ROOT),
            capture_output: false,
            silent: false,
            output: OutputCapture::new(),
        }
    }
}

impl Command {
    /// Create a command from its argv parts.
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parts: parts.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Add an argument.
    pub fn arg(mut self, part: impl Into<String>) -> Self {
        self.parts.push(part.into());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parts.extend(parts.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.root = dir.into();
        self
    }

    /// Keep the output read while polling.
    pub const fn capture(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }

    /// Keep output off the console while running.
    pub const fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn push(&mut self, part: impl Into<String>) -> &mut Self {
        self.parts.push(part.into());
        self
    }

    pub fn push_many<I, S>(&mut self, parts: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parts.extend(parts.into_iter().map(Into::into));
        self
    }

    /// Append filesystem paths as arguments.
    pub fn push_paths<I, P>(&mut self, paths: I) -> &mut Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.parts.extend(
            paths
                .into_iter()
                .map(|p| p.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Drop all argv parts so the command can be rebuilt.
    pub fn clear(&mut self) {
        self.parts.clear();
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn has_default_root(&self) -> bool {
        self.root.as_os_str() == DEFAULT_ROOT
    }

    /// Printable form of the command, for logs and failure reports.
    ///
    /// A non-default working directory is shown as a `[from '<dir>']` prefix.
    pub fn render(&self) -> String {
        let line = self.parts.join(" ");
        if self.has_default_root() {
            line
        } else {
            format!("[from '{}'] {line}", self.root.display())
        }
    }

    /// Output captured so far.
    pub fn output(&self) -> Cow<'_, str> {
        self.output.to_string_lossy()
    }

    pub const fn captured(&self) -> &OutputCapture {
        &self.output
    }

    /// Start the command and return a handle to poll it.
    ///
    /// A program that cannot be executed does not fail the launch: the handle
    /// completes with [`EXEC_FAILED`](super::handle::EXEC_FAILED) and a
    /// diagnostic as its output, just as a forked child failing `exec` would.
    ///
    /// # Errors
    ///
    /// Fails on an empty command, a missing working directory, or when the
    /// OS is out of terminals, processes, memory or file descriptors.
    pub fn launch(&self) -> Result<ProcessHandle> {
        let Some(program) = self.parts.first().filter(|p| !p.is_empty()) else {
            return Err(RunnerError::EmptyCommand);
        };

        let rendered = self.render();
        if !self.silent {
            println!("CMD: {rendered}");
        }
        info!(command = %rendered, "Launching command");

        let mut cmd = process::Command::new(program);
        cmd.args(&self.parts[1..]);

        if !self.has_default_root() {
            self.check_root()?;
            cmd.current_dir(&self.root);
        }

        let (master, slave) = pty::open().map_err(RunnerError::Pty)?;
        cmd.stdin(Stdio::null());
        cmd.stdout(slave.stdio().map_err(RunnerError::Pty)?);
        cmd.stderr(slave.stdio().map_err(RunnerError::Pty)?);

        let spawned = cmd.spawn();

        // Only the child may hold the slave, or the master never hangs up
        drop(cmd);
        drop(slave);

        match spawned {
            Ok(child) => Ok(ProcessHandle::spawned(child, master, self.silent)),
            Err(source) if is_resource_exhausted(&source) => Err(RunnerError::Spawn {
                command: rendered,
                source,
            }),
            Err(e) => {
                warn!(command = %rendered, error = %e, "Could not exec child process");
                Ok(ProcessHandle::exec_failed(
                    &format!("Could not exec '{program}': {e}"),
                    self.silent,
                ))
            }
        }
    }

    fn check_root(&self) -> Result<()> {
        let meta = fs::metadata(&self.root).map_err(|source| RunnerError::WorkingDir {
            path: self.root.clone(),
            source,
        })?;

        if meta.is_dir() {
            Ok(())
        } else {
            Err(RunnerError::WorkingDir {
                path: self.root.clone(),
                source: io::Error::other("not a directory"),
            })
        }
    }

    /// Poll a handle launched from this command, capturing into this command.
    ///
    /// # Errors
    ///
    /// See [`ProcessHandle::poll`].
    pub fn poll_handle(&mut self, handle: &mut ProcessHandle) -> Result<bool> {
        let output = self.capture_output.then_some(&mut self.output);
        handle.poll(output)
    }

    /// Block on a handle launched from this command, capturing into this command.
    ///
    /// # Errors
    ///
    /// See [`ProcessHandle::wait`].
    pub fn await_handle(&mut self, handle: &mut ProcessHandle) -> Result<i32> {
        while !self.poll_handle(handle)? {
            thread::sleep(POLL_INTERVAL);
        }
        handle
            .exit_code()
            .ok_or(RunnerError::Killed {
                pid: handle.pid().unwrap_or_default(),
            })
    }

    /// Forget output captured by earlier runs.
    pub fn clear_output(&mut self) {
        self.output.clear();
    }

    /// Run to completion and return the exit code.
    ///
    /// Output from a previous run is discarded first.
    ///
    /// # Errors
    ///
    /// Fails if the command cannot be launched or polled. A non-zero exit is
    /// not an error here.
    pub fn run(&mut self) -> Result<i32> {
        self.clear_output();
        let mut handle = self.launch()?;
        self.await_handle(&mut handle)
    }

    /// Run to completion and require a zero exit code.
    ///
    /// # Errors
    ///
    /// Everything [`run`](Self::run) can fail with, plus
    /// [`RunnerError::CommandFailed`] on a non-zero exit.
    pub fn check(&mut self) -> Result<()> {
        let code = self.run()?;
        if code == 0 {
            Ok(())
        } else {
            Err(RunnerError::CommandFailed {
                command: self.render(),
                code,
            })
        }
    }
}

/// Whether a spawn failure happened before `exec` because the system ran out of
/// processes, memory or descriptors. Anything else means the program itself
/// could not be executed.
fn is_resource_exhausted(e: &io::Error) -> bool {
    e.raw_os_error().is_some_and(|code| {
        [Errno::EAGAIN, Errno::ENOMEM, Errno::EMFILE, Errno::ENFILE]
            .iter()
            .any(|errno| *errno as i32 == code)
    })
}
