//! webscenario - edit and run web test scenarios
//!
//! Scenario files are built node by node from the command line and executed
//! against a dry-run driver that records what a browser would have been
//! asked to do.

use clap::Parser;
use commands::Commands;
use webscenario::common::{config::Config, logging};
use webscenario::{cli, commands};

#[derive(Parser)]
#[command(name = "webscenario", about = "Edit and run web test scenarios")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    logging::init_cli();

    let cli = Cli::parse();

    let result = match Config::load() {
        Ok(config) => cli::dispatch(cli.command, &config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        if e.is_edit_error() {
            eprintln!("The scenario file was not changed.");
        }
        std::process::exit(1);
    }
}
