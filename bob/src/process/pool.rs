//! Bounded pool for running a batch of commands.
//!
//! [`CmdRunner`] keeps a fixed number of slots. Queued commands are launched
//! into free slots in order, every running slot is polled without blocking,
//! and a finished slot immediately takes the next command. All polling happens
//! on the calling thread; the parallelism is the children themselves.

use std::io::{self, Write};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::handle::{ProcessHandle, POLL_INTERVAL};
use super::spawn::Command;
use crate::error::Result;

/// A command occupying a slot.
#[derive(Debug)]
struct Running {
    index: usize,
    handle: ProcessHandle,
    started: Instant,
}

/// One execution lane. `None` means idle and ready for the next command.
type Slot = Option<Running>;

/// Runs queued commands with at most `process_count` alive at once.
///
/// Failures do not stop the batch: every queued command runs, and exit codes
/// are reported by queue position regardless of completion order.
///
/// # Example
///
/// ```rust,no_run
/// use bob::process::{CmdRunner, Command};
///
/// fn main() -> Result<(), bob::error::RunnerError> {
///     let mut runner = CmdRunner::new(2);
///     runner.push(Command::new(["cc", "-c", "a.c"]));
///     runner.push(Command::new(["cc", "-c", "b.c"]));
///     runner.push(Command::new(["cc", "-c", "c.c"]));
///
///     if !runner.run()? {
///         runner.print_failed();
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct CmdRunner {
    cmds: Vec<Command>,
    exit_codes: Vec<Option<i32>>,
    durations: Vec<Option<Duration>>,
    slots: Vec<Slot>,
    cursor: usize,
    peak_running: usize,
    poll_interval: Duration,
}

impl Default for CmdRunner {
    /// A runner with one slot per available CPU.
    fn default() -> Self {
        let parallelism = thread::available_parallelism().map_or(1, usize::from);
        Self::new(parallelism)
    }
}

impl CmdRunner {
    /// Create a runner with a fixed number of slots.
    ///
    /// A count of zero is treated as one.
    pub fn new(process_count: usize) -> Self {
        if process_count == 0 {
            warn!("Process count must be greater than 0, using 1");
        }
        let process_count = process_count.max(1);

        Self {
            cmds: Vec::new(),
            exit_codes: Vec::new(),
            durations: Vec::new(),
            slots: std::iter::repeat_with(|| None).take(process_count).collect(),
            cursor: 0,
            peak_running: 0,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Create a runner sized to the host and queue `cmds`.
    pub fn from_cmds(cmds: impl IntoIterator<Item = Command>) -> Self {
        let mut runner = Self::default();
        runner.push_many(cmds);
        runner
    }

    /// Set how long to sleep when a pass over the slots made no progress.
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Queue a command. Queued commands never echo to the console, since
    /// concurrent output would interleave.
    pub fn push(&mut self, mut cmd: Command) {
        cmd.silent = true;
        self.cmds.push(cmd);
    }

    pub fn push_many(&mut self, cmds: impl IntoIterator<Item = Command>) {
        for cmd in cmds {
            self.push(cmd);
        }
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.cmds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
    }

    /// Forget all queued commands and their results.
    pub fn clear(&mut self) {
        self.kill_running();
        self.cmds.clear();
        self.exit_codes.clear();
        self.durations.clear();
        self.cursor = 0;
        self.peak_running = 0;
    }

    /// Turn output capture on or off for every queued command.
    pub fn capture_output(&mut self, capture: bool) {
        for cmd in &mut self.cmds {
            cmd.capture_output = capture;
        }
    }

    pub fn process_count(&self) -> usize {
        self.slots.len()
    }

    pub fn commands(&self) -> &[Command] {
        &self.cmds
    }

    /// Exit code per queued command. `None` means it has not finished.
    pub fn exit_codes(&self) -> &[Option<i32>] {
        &self.exit_codes
    }

    /// Wall time per queued command, measured from launch to the poll that
    /// saw it finish.
    pub fn durations(&self) -> &[Option<Duration>] {
        &self.durations
    }

    /// Most slots that were running at the same time during the last run.
    pub const fn peak_running(&self) -> usize {
        self.peak_running
    }

    /// Run every queued command and wait for all of them.
    ///
    /// Returns `true` when every command exited with status 0.
    ///
    /// # Errors
    ///
    /// Fails on an OS-level error launching or polling a command. Any
    /// commands still running at that point are killed before returning.
    pub fn run(&mut self) -> Result<bool> {
        self.exit_codes = vec![None; self.cmds.len()];
        self.durations = vec![None; self.cmds.len()];
        self.cursor = 0;
        self.peak_running = 0;
        for cmd in &mut self.cmds {
            cmd.clear_output();
        }

        info!(
            commands = self.cmds.len(),
            slots = self.slots.len(),
            "Starting batch"
        );

        if let Err(e) = self.fill().and_then(|()| self.drain()) {
            self.kill_running();
            return Err(e);
        }

        debug_assert!(self.exit_codes.iter().all(Option::is_some));
        Ok(!self.any_failed())
    }

    /// Launch commands into slots until the queue is exhausted.
    fn fill(&mut self) -> Result<()> {
        self.populate_slots()?;
        while self.any_waiting() {
            if !self.populate_slots()? {
                thread::sleep(self.poll_interval);
            }
        }
        Ok(())
    }

    /// Wait for the slots still running after the last launch.
    fn drain(&mut self) -> Result<()> {
        while self.slots.iter().any(Option::is_some) {
            for i in 0..self.slots.len() {
                self.poll_slot(i)?;
            }
            if self.slots.iter().any(Option::is_some) {
                thread::sleep(self.poll_interval);
            }
        }
        Ok(())
    }

    /// One pass over all slots. Returns whether any command was launched.
    fn populate_slots(&mut self) -> Result<bool> {
        let mut did_work = false;

        for i in 0..self.slots.len() {
            if !self.poll_slot(i)? || !self.any_waiting() {
                continue;
            }

            let index = self.cursor;
            self.cursor += 1;

            let handle = self.cmds[index].launch()?;
            debug!(slot = i, index, "Slot picked up command");
            self.slots[i] = Some(Running {
                index,
                handle,
                started: Instant::now(),
            });
            did_work = true;

            let running = self.slots.iter().filter(|s| s.is_some()).count();
            self.peak_running = self.peak_running.max(running);
        }

        Ok(did_work)
    }

    /// Poll the command in slot `i`, recording its result if it finished.
    ///
    /// Returns whether the slot is now free.
    fn poll_slot(&mut self, i: usize) -> Result<bool> {
        let Some(running) = self.slots[i].as_mut() else {
            return Ok(true);
        };

        let index = running.index;
        if !self.cmds[index].poll_handle(&mut running.handle)? {
            return Ok(false);
        }

        self.exit_codes[index] = running.handle.exit_code();
        self.durations[index] = Some(running.started.elapsed());
        debug!(
            slot = i,
            index,
            code = ?self.exit_codes[index],
            "Slot finished command"
        );
        self.slots[i] = None;
        Ok(true)
    }

    fn any_waiting(&self) -> bool {
        self.cursor < self.cmds.len()
    }

    /// Kill every command currently occupying a slot.
    ///
    /// Returns how many processes were killed. Their exit codes stay `None`.
    pub fn kill_running(&mut self) -> usize {
        let mut killed = 0;
        for slot in &mut self.slots {
            if let Some(mut running) = slot.take() {
                if running.handle.kill() {
                    killed += 1;
                }
            }
        }
        if killed > 0 {
            warn!(killed, "Killed running commands");
        }
        killed
    }

    /// Whether any command failed or never finished.
    pub fn any_failed(&self) -> bool {
        self.exit_codes.iter().any(|code| *code != Some(0))
    }

    pub fn all_succeeded(&self) -> bool {
        !self.any_failed()
    }

    /// Failed commands with their queue position and exit code.
    pub fn failed(&self) -> impl Iterator<Item = (usize, &Command, Option<i32>)> {
        self.cmds
            .iter()
            .zip(&self.exit_codes)
            .enumerate()
            .filter(|(_, (_, code))| **code != Some(0))
            .map(|(i, (cmd, code))| (i, cmd, *code))
    }

    /// Write each failed command and its captured output to `w`.
    ///
    /// # Errors
    ///
    /// Propagates write errors from `w`.
    pub fn write_failed(&self, w: &mut impl Write) -> io::Result<()> {
        for (_, cmd, code) in self.failed() {
            match code {
                Some(code) => writeln!(w, "FAILED ({code}): {}", cmd.render())?,
                None => writeln!(w, "FAILED (did not finish): {}", cmd.render())?,
            }
            let output = cmd.output();
            if !output.is_empty() {
                w.write_all(output.as_bytes())?;
                if !output.ends_with('\n') {
                    writeln!(w)?;
                }
            }
        }
        Ok(())
    }

    /// Print every failed command and its captured output to stderr.
    pub fn print_failed(&self) {
        if let Err(e) = self.write_failed(&mut io::stderr().lock()) {
            warn!(error = %e, "Failed to print failed commands");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::handle::EXEC_FAILED;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn fast(process_count: usize) -> CmdRunner {
        CmdRunner::new(process_count).with_poll_interval(Duration::from_millis(5))
    }

    #[test]
    fn test_mixed_results() {
        let mut runner = fast(2);
        runner.push(Command::new(["true"]));
        runner.push(Command::new(["false"]));
        runner.push(Command::new(["true"]));

        assert!(!runner.run().unwrap());
        assert_eq!(runner.exit_codes(), [Some(0), Some(1), Some(0)]);
        assert!(runner.any_failed());
        assert!(!runner.all_succeeded());
    }

    #[test]
    fn test_empty_batch() {
        let mut runner = fast(4);

        assert!(runner.run().unwrap());
        assert!(runner.exit_codes().is_empty());
        assert_eq!(runner.peak_running(), 0);
    }

    #[test]
    fn test_exit_codes_follow_queue_order() {
        // Later commands finish first
        let mut runner = fast(4);
        for (i, delay) in ["0.3", "0.2", "0.1", "0"].iter().enumerate() {
            let script = format!("sleep {delay}; exit {}", i + 10);
            runner.push(Command::new(["sh", "-c", script.as_str()]));
        }

        assert!(!runner.run().unwrap());
        assert_eq!(runner.exit_codes(), [Some(10), Some(11), Some(12), Some(13)]);
    }

    #[test]
    fn test_concurrency_limit() {
        let mut runner = fast(1);
        runner.push(Command::new(["sleep", "0.1"]));
        runner.push(Command::new(["sleep", "0.1"]));

        let start = Instant::now();
        assert!(runner.run().unwrap());

        // With a single slot the sleeps cannot overlap
        assert!(start.elapsed() >= Duration::from_millis(180));
        assert_eq!(runner.peak_running(), 1);
    }

    #[test]
    fn test_peak_never_exceeds_slots() {
        let mut runner = fast(3);
        for _ in 0..8 {
            runner.push(Command::new(["sleep", "0.05"]));
        }

        assert!(runner.run().unwrap());
        assert_eq!(runner.peak_running(), 3);
        assert!(runner.durations().iter().all(Option::is_some));
    }

    #[test]
    fn test_slots_run_in_parallel() {
        let mut runner = fast(4);
        for _ in 0..4 {
            runner.push(Command::new(["sleep", "0.2"]));
        }

        let start = Instant::now();
        assert!(runner.run().unwrap());
        assert!(start.elapsed() < Duration::from_millis(700));
    }

    #[test]
    fn test_push_forces_silent() {
        let mut runner = fast(1);
        runner.push(Command::new(["true"]).silent(false));

        assert!(runner.commands()[0].silent);
    }

    #[test]
    fn test_capture_output_per_command() {
        let mut runner = fast(2);
        runner.push(Command::new(["sh", "-c", "echo first"]));
        runner.push(Command::new(["sh", "-c", "echo second; exit 2"]));
        runner.capture_output(true);

        assert!(!runner.run().unwrap());
        assert_eq!(runner.commands()[0].output(), "first\n");
        assert_eq!(runner.commands()[1].output(), "second\n");
    }

    #[test]
    fn test_failed_report() {
        let mut runner = fast(2);
        runner.push(Command::new(["sh", "-c", "echo fine"]));
        runner.push(Command::new(["sh", "-c", "echo broken; exit 3"]));
        runner.push(Command::new(["nonexistent_command_12345"]));
        runner.capture_output(true);

        assert!(!runner.run().unwrap());

        let failed: Vec<_> = runner.failed().map(|(i, _, code)| (i, code)).collect();
        assert_eq!(failed, [(1, Some(3)), (2, Some(EXEC_FAILED))]);

        let mut out = Vec::new();
        runner.write_failed(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("FAILED (3): sh -c echo broken; exit 3\nbroken\n"));
        assert!(text.contains("FAILED (127): nonexistent_command_12345"));
        assert!(!text.contains("fine"));
    }

    #[test]
    fn test_unexecutable_program_does_not_abort_batch() {
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("garbage");
        fs::write(&program, b"\x7fELF\0\x01\x02\x03").unwrap();
        fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).unwrap();

        let mut runner = fast(2);
        runner.push(Command::new(["true"]));
        runner.push(Command::new([program.to_string_lossy()]));
        runner.push(Command::new(["true"]));

        assert!(!runner.run().unwrap());
        assert_eq!(runner.exit_codes(), [Some(0), Some(EXEC_FAILED), Some(0)]);
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failed_surfaces_write_errors() {
        let mut runner = fast(1);
        runner.push(Command::new(["false"]));
        assert!(!runner.run().unwrap());

        let err = runner.write_failed(&mut BrokenPipe).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);

        // Logged, not panicked
        runner.print_failed();
    }

    #[test]
    fn test_rerun_replaces_captured_output() {
        let mut runner = fast(1);
        runner.push(Command::new(["sh", "-c", "echo hi"]));
        runner.capture_output(true);

        assert!(runner.run().unwrap());
        assert!(runner.run().unwrap());
        assert_eq!(runner.commands()[0].output(), "hi\n");
    }

    #[test]
    fn test_rerun_resets_results() {
        let mut runner = fast(2);
        runner.push(Command::new(["false"]));
        assert!(!runner.run().unwrap());

        runner.clear();
        assert!(runner.is_empty());
        runner.push(Command::new(["true"]));

        assert!(runner.run().unwrap());
        assert_eq!(runner.exit_codes(), [Some(0)]);
    }

    #[test]
    fn test_zero_slots_clamped() {
        assert_eq!(CmdRunner::new(0).process_count(), 1);
        assert!(CmdRunner::default().process_count() >= 1);
    }

    #[test]
    fn test_from_cmds() {
        let mut runner = CmdRunner::from_cmds([Command::new(["true"]), Command::new(["true"])]);

        assert_eq!(runner.len(), 2);
        assert!(runner.run().unwrap());
    }

    #[test]
    fn test_launch_error_aborts_batch() {
        let mut runner = fast(2);
        runner.push(Command::new(["sleep", "5"]));
        runner.push(Command::default());

        assert!(runner.run().is_err());
        assert_eq!(runner.kill_running(), 0);
        assert_eq!(runner.exit_codes()[0], None);
    }
}
