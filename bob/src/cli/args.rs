//! CLI argument definitions.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

/// Bob - run build commands concurrently with captured output
#[derive(Parser, Debug)]
#[command(name = "bob")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v for info, -vv for debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a single command attached to a pseudo-terminal
    Run {
        /// Directory to run the command in
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Print the captured output again once the command finishes
        #[arg(long)]
        capture: bool,

        /// Do not echo output while the command runs
        #[arg(short, long)]
        quiet: bool,

        /// Program and arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },

    /// Run shell command lines from a file (or stdin) concurrently
    Batch {
        /// Number of concurrent slots (defaults to the number of CPUs)
        #[arg(short, long, env = "BOB_JOBS")]
        jobs: Option<usize>,

        /// File with one command per line; reads stdin when omitted
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Directory to run every command in
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Shell used to interpret each line
        #[arg(long, default_value = "sh")]
        shell: String,

        /// Milliseconds to sleep between polls when nothing changed
        #[arg(long, env = "BOB_POLL_MS", default_value_t = 20)]
        poll_ms: u64,

        /// Print a JSON report instead of the summary
        #[arg(long)]
        json: bool,
    },
}
