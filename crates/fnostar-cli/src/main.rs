mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::error::CliError;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(error) = run(&cli) {
        // A failed load still reports what it committed.
        if let CliError::Load(failure) = &error {
            if let Err(render_error) = output::render(failure.report.as_ref(), cli.pretty) {
                eprintln!("error: could not print the partial run report: {render_error}");
            }
        }
        eprintln!("error: {error}");
        std::process::exit(error.exit_code());
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let data = commands::run(cli)?;
    output::render(&data, cli.pretty)
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
