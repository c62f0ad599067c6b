mod cli;
mod config;
mod error;
mod run;
mod serial_port;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::{cli::Cli, config::Config, error::AppError};

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    if let Err(e) = try_main(cli) {
        tracing::error!(error = %e, "fatal error, exiting");
        std::process::exit(1);
    }
}

fn try_main(cli: Cli) -> Result<(), AppError> {
    let config = Config::load(&cli)?;
    run::run(config)
}

fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
