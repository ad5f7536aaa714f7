//! Process launching, polling and batch scheduling.
//!
//! Everything here is synchronous: a single thread launches children, polls
//! them without blocking and sleeps briefly when nothing changed. Concurrency
//! comes from the child processes running side by side.

mod capture;
mod handle;
mod pool;
mod pty;
mod spawn;

pub use capture::OutputCapture;
pub use handle::{ProcessHandle, EXEC_FAILED, POLL_INTERVAL};
pub use pool::CmdRunner;
pub use spawn::Command;
