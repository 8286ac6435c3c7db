use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod output;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "WPCONFIG_LOG";

fn main() {
    let cli = cli::Cli::parse();
    init_logging(cli.debug, cli.quiet);
    process::exit(commands::run(cli));
}

fn init_logging(debug: bool, quiet: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}
