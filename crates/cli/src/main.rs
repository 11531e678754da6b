// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `emx` — a small demonstration binary that wires the seed-scenario
//! machines from [`scenarios`] up to a real `tokio` runtime and a
//! file-backed actor system.

mod env;
mod exit_error;
mod scenarios;

use clap::{Parser, Subcommand};
use exit_error::ExitError;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "emx", about = "Demonstration harness for the emx actor runtime")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one of the built-in scenario machines to completion.
    Demo {
        #[arg(value_enum)]
        scenario: scenarios::Scenario,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run() -> Result<(), ExitError> {
    let cli = Cli::parse();
    let state_dir = env::state_dir().map_err(|err| ExitError::new(1, err.to_string()))?;

    match cli.command {
        Command::Demo { scenario } => scenarios::run(scenario, &state_dir)
            .await
            .map_err(|err| ExitError::new(1, format!("{err:#}"))),
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_tracing();

    match run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::ExitCode::from(err.code as u8)
        }
    }
}
