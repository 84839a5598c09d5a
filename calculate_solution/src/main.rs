//! Hello world object extension for the calculate solution phase.
//!
//! Usage: `calculate_solution rmqHost rmqUser rmqPassword contentType concurrentConsumers`

mod cli;
mod client;
mod extension;

use std::process::ExitCode;

use extensibility::App;
use tracing::{error, info_span};
use tracing_subscriber::EnvFilter;

use cli::StartupParams;
use extension::CalculateSolutionExtension;

/// Exit code for invalid startup parameters.
const USAGE_ERROR: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let extension = CalculateSolutionExtension::new(info_span!("calculate_solution"));
    let app = match extension.start(std::env::args_os(), App::new(())) {
        Ok(app) => app,
        Err(e) if !e.use_stderr() => {
            // --help and --version.
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            error!("{}", StartupParams::invalid_arguments(&e));
            return ExitCode::from(USAGE_ERROR);
        }
    };

    match app.graceful_shutdown_on_signal().run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Extension stopped: {e:#}");
            ExitCode::FAILURE
        }
    }
}
