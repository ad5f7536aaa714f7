//! Error types for process launching and polling.

use std::io;
use std::path::PathBuf;

/// Errors raised while launching, polling or checking child processes.
///
/// A command exiting with a non-zero status is not an error on its own; only
/// [`Command::check`](crate::process::Command::check) turns it into one.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("No command to run")]
    EmptyCommand,

    #[error("Could not open pseudo-terminal: {0}")]
    Pty(#[source] io::Error),

    #[error("Could not change directory to {}: {source}", path.display())]
    WorkingDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Could not spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Error while polling child process {pid}: {source}")]
    Wait {
        pid: u32,
        #[source]
        source: io::Error,
    },

    #[error("Error reading output of child process {pid}: {source}")]
    Output {
        pid: u32,
        #[source]
        source: io::Error,
    },

    #[error("Child process {pid} did not terminate normally (signal {signal})")]
    Signaled { pid: u32, signal: i32 },

    #[error("Child process {pid} was killed before it finished")]
    Killed { pid: u32 },

    #[error("Command '{command}' failed with exit status: {code}")]
    CommandFailed { command: String, code: i32 },
}

pub type Result<T, E = RunnerError> = std::result::Result<T, E>;
