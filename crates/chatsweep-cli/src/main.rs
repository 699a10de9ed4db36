//! Chatsweep CLI
//!
//! Batch cleanup for a chat application's main database, vector database and
//! uploads directory.

use anyhow::Result;
use chatsweep_core::error::exit_codes;
use chatsweep_core::{sweep, Config, SweepError, TracingObserver, UploadsDir};
use clap::Parser;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::EnvFilter;

mod app;

use app::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::ERROR
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err
                .downcast_ref::<SweepError>()
                .map(SweepError::exit_code)
                .unwrap_or(exit_codes::GENERAL_ERROR);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .inspect_err(|err| tracing::error!("Error loading config: {}", err))?;

    let options = cli.sweep_options(&config);
    let uploads = UploadsDir::new(&cli.uploads_dir);
    let report = sweep(
        &cli.main_db_url,
        &cli.vector_db_url,
        &uploads,
        &options,
        &TracingObserver,
    )?;

    tracing::info!(
        dry_run = options.is_dry_run(),
        debug = options.debug,
        "Cleanup finished: {}",
        report
    );
    Ok(())
}
