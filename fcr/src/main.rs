//! Full cluster restart harness CLI.
#![forbid(unsafe_code)]

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use fcr::cli::{self, Cli, Commands, EXIT_FIXTURE_FAILED, EXIT_SETUP_ERROR};
use fcr_common::{LogConfig, UreqTransport, init_logging};
use tracing::error;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env("info").with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _logging_guards = match init_logging(&log_config) {
        Ok(guards) => guards,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::from(EXIT_SETUP_ERROR);
        }
    };

    match execute(cli) {
        Ok(code) => code,
        Err(err) => {
            error!(error = %format!("{err:#}"), "run could not be set up");
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_SETUP_ERROR)
        }
    }
}

fn execute(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Run(args) => {
            let config = cli::resolve_config(cli.config.as_deref(), &args.overrides)?;
            let transport = UreqTransport::new(config.endpoint.value.clone(), config.client_timeout.value);
            let report = cli::run_phase(&config, transport, &args)?;
            println!("{}", report.render_text());
            if report.is_success() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(EXIT_FIXTURE_FAILED))
            }
        }
        Commands::List => {
            for row in cli::fixture_listing() {
                println!("{row}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::ShowConfig(overrides) => {
            let config = cli::resolve_config(cli.config.as_deref(), &overrides)?;
            println!("{}", cli::render_config(&config));
            Ok(ExitCode::SUCCESS)
        }
    }
}
