use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use hostkeeper::commands::{self, Cli};
use hostkeeper::{application, logging, report, sysexits};

/// Entry point for the hk CLI application.
/// Parses command-line arguments, runs the selected pipeline and prints its report.
fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = match cli.config {
        Some(path) => path,
        None => application::config_file()
            .context("cannot determine the configuration directory, pass --config")?,
    };

    let result = match commands::run(&cli.command, &config) {
        Ok(result) => result,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("Error: {:#}", anyhow::Error::new(err));
            process::exit(code);
        }
    };

    print!("{}", report::render(&result));
    if !result.success() {
        process::exit(sysexits::EX_FAILURE);
    }
    Ok(())
}
