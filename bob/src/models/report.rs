//! Batch report emitted by `bob batch --json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::CommandStatus;
use crate::process::CmdRunner;

/// Result of one queued command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandReport {
    /// Position in the queue.
    pub index: usize,
    /// Rendered command line.
    pub command: String,
    pub status: CommandStatus,
    /// Exit code, if the command finished.
    pub exit_code: Option<i32>,
    /// Wall time in milliseconds, if the command finished.
    pub duration_ms: Option<u64>,
    /// Captured output (empty unless capture was enabled).
    pub output: String,
}

/// Result of a whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// Whether every command exited with status 0.
    pub success: bool,
    /// Number of concurrent slots.
    pub process_count: usize,
    /// Most commands that ran at once.
    pub peak_running: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub commands: Vec<CommandReport>,
}

impl BatchReport {
    /// Collect the results of a runner after [`CmdRunner::run`].
    pub fn from_runner(
        runner: &CmdRunner,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let commands = runner
            .commands()
            .iter()
            .enumerate()
            .map(|(index, cmd)| {
                let exit_code = runner.exit_codes().get(index).copied().flatten();
                let duration_ms = runner
                    .durations()
                    .get(index)
                    .copied()
                    .flatten()
                    .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));

                CommandReport {
                    index,
                    command: cmd.render(),
                    status: CommandStatus::from_exit_code(exit_code),
                    exit_code,
                    duration_ms,
                    output: cmd.output().into_owned(),
                }
            })
            .collect();

        Self {
            success: runner.all_succeeded(),
            process_count: runner.process_count(),
            peak_running: runner.peak_running(),
            started_at,
            finished_at,
            commands,
        }
    }

    /// Reports for commands that did not succeed.
    pub fn failures(&self) -> impl Iterator<Item = &CommandReport> {
        self.commands.iter().filter(|c| !c.status.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::Command;
    use std::time::Duration;

    #[test]
    fn test_report_from_runner() {
        let mut runner = CmdRunner::new(2).with_poll_interval(Duration::from_millis(5));
        runner.push(Command::new(["sh", "-c", "echo ok"]));
        runner.push(Command::new(["sh", "-c", "echo bad; exit 4"]));
        runner.capture_output(true);

        let started_at = Utc::now();
        runner.run().unwrap();
        let report = BatchReport::from_runner(&runner, started_at, Utc::now());

        assert!(!report.success);
        assert_eq!(report.process_count, 2);
        assert_eq!(report.commands.len(), 2);
        assert_eq!(report.commands[0].status, CommandStatus::Succeeded);
        assert_eq!(report.commands[0].output, "ok\n");
        assert_eq!(report.commands[1].exit_code, Some(4));
        assert!(report.commands[1].duration_ms.is_some());

        let failures: Vec<_> = report.failures().map(|c| c.index).collect();
        assert_eq!(failures, [1]);
    }

    #[test]
    fn test_report_json_shape() {
        let runner = CmdRunner::new(1);
        let now = Utc::now();
        let report = BatchReport::from_runner(&runner, now, now);

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["commands"], serde_json::json!([]));
        assert!(value["started_at"].is_string());
    }
}
