//! `emustack` -- run a LocalStack emulator container as a test fixture.

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use std::process::ExitCode;

use clap::Parser;

use emustack_core::config::{EmustackConfig, GeneralConfig};

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    // `config validate` reports a broken file itself, so loading failures
    // are deferred until a command needs the configuration
    let loaded = EmustackConfig::load_or_default(&cli.config).await;

    let mut general = loaded
        .as_ref()
        .map(|config| config.general.clone())
        .unwrap_or_else(|_| GeneralConfig::default());
    if let Some(level) = &cli.log_level {
        general.log_level = level.clone();
    }
    logging::init_tracing(&general).map_err(|e| CliError::Config(e.to_string()))?;
    emustack_core::metrics::describe_all();

    tracing::debug!(config = %cli.config.display(), "emustack starting");

    let writer = OutputWriter::new(cli.output);
    match cli.command {
        Commands::Up(args) => commands::up::execute(args, loaded?, &writer).await,
        Commands::Status => commands::status::execute(loaded?, &writer).await,
        Commands::Health(args) => commands::health::execute(args, &writer).await,
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
    }
}
