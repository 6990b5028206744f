mod cli;
mod commands;
mod error;
mod http;
mod logging;
mod settings;

use std::process::ExitCode;

use clap::Parser;

use crate::cli::Cli;
use crate::settings::AppSettings;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let (mut settings, load_error) = AppSettings::load();

    logging::init_logging(
        cli.verbose || settings.debug_logging,
        cli.verbose,
        settings.max_log_size_bytes,
    );

    if let Some(error) = load_error {
        log::warn!("Using default settings: {error}");
        eprintln!("warning: {error}; using default settings");
    }

    match commands::run(cli.command, &mut settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::error!("{error}");
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}
