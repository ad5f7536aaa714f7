//! CLI command execution.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;

use bob::models::{BatchReport, CommandReport};
use bob::process::{CmdRunner, Command};

use super::args::{Cli, Commands};

/// Execute the parsed CLI.
pub fn execute(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Run {
            dir,
            capture,
            quiet,
            command,
        } => run_single(command, dir, capture, quiet),
        Commands::Batch {
            jobs,
            file,
            dir,
            shell,
            poll_ms,
            json,
        } => {
            let source = read_source(file.as_deref())?;
            let lines = parse_command_lines(&source);

            let mut runner = jobs
                .map_or_else(CmdRunner::default, CmdRunner::new)
                .with_poll_interval(Duration::from_millis(poll_ms));
            for line in lines {
                let mut cmd = Command::new([shell.as_str(), "-c", line]);
                if let Some(ref dir) = dir {
                    cmd = cmd.working_dir(dir);
                }
                runner.push(cmd);
            }
            let success = run_batch(&mut runner, json)?;
            Ok(if success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn run_single(
    parts: Vec<String>,
    dir: Option<PathBuf>,
    capture: bool,
    quiet: bool,
) -> Result<ExitCode> {
    let mut cmd = Command::new(parts).capture(capture).silent(quiet);
    if let Some(dir) = dir {
        cmd = cmd.working_dir(dir);
    }

    let code = cmd
        .run()
        .with_context(|| format!("Failed to run {}", cmd.render()))?;

    if capture {
        println!();
        println!("======== OUTPUT ========");
        print!("{}", cmd.output());
        println!("========================");
    }

    Ok(ExitCode::from(exit_status(code)))
}

/// Run a prepared batch and report on it. Returns whether every command passed.
fn run_batch(runner: &mut CmdRunner, json: bool) -> Result<bool> {
    runner.capture_output(true);

    let started_at = Utc::now();
    let success = runner.run().context("Batch aborted")?;
    let report = BatchReport::from_runner(runner, started_at, Utc::now());

    if json {
        let out = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        println!("{out}");
    } else {
        for entry in &report.commands {
            println!("{}", summary_line(entry));
        }
        let failed = report.failures().count();
        println!(
            "{}/{} commands succeeded",
            report.commands.len() - failed,
            report.commands.len()
        );
        if !success {
            eprintln!();
            runner.print_failed();
        }
    }

    Ok(success)
}

/// Read the batch source from a file, or stdin when no file is given.
fn read_source(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut source = String::new();
            io::stdin()
                .read_to_string(&mut source)
                .context("Failed to read commands from stdin")?;
            Ok(source)
        }
    }
}

/// Command lines in a batch source, skipping blanks and `#` comments.
fn parse_command_lines(source: &str) -> Vec<&str> {
    source
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

fn summary_line(entry: &CommandReport) -> String {
    let timing = entry
        .duration_ms
        .map(|ms| format!(" ({ms} ms)"))
        .unwrap_or_default();
    match entry.exit_code {
        Some(0) => format!("[ok] {}{timing}", entry.command),
        Some(code) => format!("[{} {code}] {}{timing}", entry.status, entry.command),
        None => format!("[{}] {}", entry.status, entry.command),
    }
}

/// Map a child's exit status onto our own, which must fit in a byte.
fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bob::models::CommandStatus;

    #[test]
    fn test_parse_command_lines() {
        let source = "\n# build\ncc -c a.c\n   \n  cc -c b.c  \n#cc -c c.c\n";
        assert_eq!(parse_command_lines(source), ["cc -c a.c", "cc -c b.c"]);
    }

    #[test]
    fn test_read_source_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmds.txt");
        std::fs::write(&path, "true\nfalse\n").unwrap();

        assert_eq!(read_source(Some(&path)).unwrap(), "true\nfalse\n");
        assert!(read_source(Some(&dir.path().join("missing"))).is_err());
    }

    #[test]
    fn test_summary_line() {
        let mut entry = CommandReport {
            index: 0,
            command: "make".to_string(),
            status: CommandStatus::Succeeded,
            exit_code: Some(0),
            duration_ms: Some(12),
            output: String::new(),
        };
        assert_eq!(summary_line(&entry), "[ok] make (12 ms)");

        entry.status = CommandStatus::Failed;
        entry.exit_code = Some(2);
        assert_eq!(summary_line(&entry), "[failed 2] make (12 ms)");

        entry.status = CommandStatus::Pending;
        entry.exit_code = None;
        entry.duration_ms = None;
        assert_eq!(summary_line(&entry), "[pending] make");
    }

    #[test]
    fn test_exit_status_mapping() {
        assert_eq!(exit_status(0), 0);
        assert_eq!(exit_status(3), 3);
        assert_eq!(exit_status(127), 127);
        assert_eq!(exit_status(-1), 1);
        assert_eq!(exit_status(300), 1);
    }

    #[test]
    fn test_run_batch_reports_failure() {
        let mut runner = CmdRunner::new(2).with_poll_interval(Duration::from_millis(5));
        runner.push(Command::new(["true"]));
        runner.push(Command::new(["false"]));

        assert!(!run_batch(&mut runner, true).unwrap());
        assert_eq!(runner.exit_codes(), [Some(0), Some(1)]);
    }
}
