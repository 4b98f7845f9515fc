use std::process::ExitCode;

use clap::Parser;

mod app;
mod cli;
mod config;
mod covers;
mod credentials;
mod error;
mod logging;
mod models;
mod processor;
mod scraping;
mod shutdown;
#[cfg(test)]
mod test_support;

use app::App;
use cli::CliArgs;

#[tokio::main]
async fn main() -> ExitCode {
    let cli_args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) if e.use_stderr() => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
        Err(e) => e.exit(),
    };

    if let Err(e) = cli_args.validate() {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    let _log_guard = match logging::init(&cli_args) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("Starting library lister");

    let config = match config::AppConfig::load_with_cli_args(&cli_args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let credentials = match credentials::from_cli(&cli_args) {
        Ok(credentials) if !credentials.is_empty() => credentials,
        Ok(_) => {
            eprintln!("error: no usable credentials were given");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let shutdown_manager = shutdown::setup_shutdown_handler();
    let app = App::new_with_config(config, !cli_args.log);

    tokio::select! {
        result = app.run(&credentials, shutdown_manager.clone()) => {
            match result {
                Ok(report) => {
                    tracing::info!(
                        "Done: {} exported, {} skipped, {} failed",
                        report.processed.len(),
                        report.skipped.len(),
                        report.failed.len()
                    );
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    tracing::error!("Run aborted: {}", e);
                    eprintln!("error: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        _ = shutdown_manager.wait_for_force() => {
            tracing::error!("Run aborted by second interrupt");
            ExitCode::SUCCESS
        }
    }
}
