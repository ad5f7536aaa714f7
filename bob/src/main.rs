//! Bob - run build commands concurrently with captured output.
//!
//! `bob run` executes one command attached to a pseudo-terminal.
//! `bob batch` reads shell command lines and runs them on a bounded number
//! of slots, reporting every failure once the whole batch is done.

mod cli;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::{execute, Cli};

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "bob=warn",
        1 => "bob=info",
        _ => "bob=debug",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    execute(cli)
}
