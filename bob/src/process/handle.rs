//! Live handle on a launched child process.

use std::io::{self, Write};
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, ExitStatus};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use super::capture::OutputCapture;
use super::pty::PtyMaster;
use crate::error::{Result, RunnerError};

/// Status reported for a command whose program could not be executed.
pub const EXEC_FAILED: i32 = 127;

/// Sleep between polls while blocking on a handle.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A spawned process together with the terminal it writes to.
///
/// The handle starts out running and becomes done exactly once, either when
/// a poll observes the exit or when it is killed. Polling a done handle is a
/// no-op that returns `true`.
///
/// Dropping a handle whose process is still running kills and reaps it.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Option<Child>,
    pid: u32,
    output: Option<PtyMaster>,
    pending: Vec<u8>,
    done: bool,
    killed: bool,
    exit_code: Option<i32>,
    silent: bool,
}

impl ProcessHandle {
    pub(crate) fn spawned(child: Child, output: PtyMaster, silent: bool) -> Self {
        Self {
            pid: child.id(),
            child: Some(child),
            output: Some(output),
            pending: Vec::new(),
            done: false,
            killed: false,
            exit_code: None,
            silent,
        }
    }

    /// A handle for a program the OS refused to execute.
    ///
    /// It reports [`EXEC_FAILED`] on its first poll and delivers `message` as
    /// the process output, the same way a forked child would have printed it.
    pub(crate) fn exec_failed(message: &str, silent: bool) -> Self {
        Self {
            child: None,
            pid: 0,
            output: None,
            pending: format!("{message}\n").into_bytes(),
            done: false,
            killed: false,
            exit_code: Some(EXEC_FAILED),
            silent,
        }
    }

    /// OS process id, or `None` if no process was ever created.
    pub const fn pid(&self) -> Option<u32> {
        if self.pid == 0 {
            None
        } else {
            Some(self.pid)
        }
    }

    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Exit code, available once the handle is done. Killed processes have none.
    pub const fn exit_code(&self) -> Option<i32> {
        if self.done {
            self.exit_code
        } else {
            None
        }
    }

    /// Check on the process without blocking.
    ///
    /// Drains whatever output is ready, echoing it unless the handle is silent
    /// and appending it to `output` when given, then checks whether the child
    /// has exited. Returns `true` once the process is done.
    ///
    /// # Errors
    ///
    /// Fails if reading the terminal or waiting on the child fails, or if the
    /// child was terminated by a signal instead of exiting.
    pub fn poll(&mut self, output: Option<&mut OutputCapture>) -> Result<bool> {
        if self.done {
            return Ok(true);
        }

        let mut fresh = std::mem::take(&mut self.pending);
        self.drain(&mut fresh)?;

        let status = match self.child.as_mut() {
            // Exec failed, there is nothing to reap
            None => None,
            Some(child) => {
                let pid = self.pid;
                match child
                    .try_wait()
                    .map_err(|source| RunnerError::Wait { pid, source })?
                {
                    Some(status) => Some(status),
                    None => {
                        self.emit(&fresh, output);
                        return Ok(false);
                    }
                }
            }
        };

        // The child may have written more between the first read and exiting
        if status.is_some() {
            self.drain(&mut fresh)?;
        }
        self.emit(&fresh, output);
        self.finish(status)?;

        Ok(true)
    }

    /// Block until the process is done, polling every [`POLL_INTERVAL`].
    ///
    /// Output keeps being drained while waiting, so a chatty child never
    /// stalls on a full terminal buffer.
    ///
    /// # Errors
    ///
    /// Propagates [`poll`](Self::poll) errors, and fails with
    /// [`RunnerError::Killed`] if the handle was killed.
    pub fn wait(&mut self, mut output: Option<&mut OutputCapture>) -> Result<i32> {
        while !self.poll(output.as_deref_mut())? {
            thread::sleep(POLL_INTERVAL);
        }

        self.exit_code
            .ok_or(RunnerError::Killed { pid: self.pid })
    }

    /// Send `SIGKILL` to the process and reap it.
    ///
    /// Returns `false` if there is no live process to kill, which includes a
    /// second call on the same handle.
    pub fn kill(&mut self) -> bool {
        let Some(mut child) = self.child.take() else {
            return false;
        };

        if let Err(e) = child.kill() {
            warn!(pid = self.pid, error = %e, "Failed to kill child process");
            self.child = Some(child);
            return false;
        }

        if let Err(e) = child.wait() {
            warn!(pid = self.pid, error = %e, "Failed to reap killed child process");
        }

        debug!(pid = self.pid, "Killed child process");
        self.output = None;
        self.pending.clear();
        self.done = true;
        self.killed = true;
        self.exit_code = None;
        true
    }

    /// Whether this handle ended by [`kill`](Self::kill).
    pub const fn was_killed(&self) -> bool {
        self.killed
    }

    fn drain(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let pid = self.pid;
        let Some(master) = self.output.as_mut() else {
            return Ok(());
        };

        let open = master
            .read_available(out)
            .map_err(|source| RunnerError::Output { pid, source })?;
        if !open {
            self.output = None;
        }
        Ok(())
    }

    fn emit(&self, bytes: &[u8], output: Option<&mut OutputCapture>) {
        if bytes.is_empty() {
            return;
        }

        if !self.silent {
            let mut stdout = io::stdout().lock();
            if let Err(e) = stdout.write_all(bytes).and_then(|()| stdout.flush()) {
                warn!(pid = self.pid, error = %e, "Failed to echo child output");
            }
        }

        if let Some(output) = output {
            output.push(bytes);
        }
    }

    fn finish(&mut self, status: Option<ExitStatus>) -> Result<()> {
        self.done = true;
        self.output = None;
        self.child = None;

        let Some(status) = status else {
            return Ok(());
        };

        match status.code() {
            Some(code) => {
                debug!(pid = self.pid, code, "Child process exited");
                self.exit_code = Some(code);
                Ok(())
            }
            None => Err(RunnerError::Signaled {
                pid: self.pid,
                signal: status.signal().unwrap_or_default(),
            }),
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.child.is_some() && self.kill() {
            debug!(pid = self.pid, "Reaped unfinished child on drop");
        }
    }
}
