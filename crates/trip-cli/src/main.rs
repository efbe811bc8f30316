use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::FmtSubscriber;

use trip_cli::cli::{build_cli_command, Cli, Commands};

mod commands;

use crate::commands::{completions, distance, geohash, prepare};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {err}");
    }

    let result = match &cli.command {
        Some(Commands::Prepare(args)) => prepare::handle(args),
        Some(Commands::Geohash {
            lon,
            lat,
            precision,
            bounds,
        }) => geohash::handle(*lon, *lat, *precision, *bounds),
        Some(Commands::Distance { from, to }) => distance::handle(*from, *to),
        Some(Commands::Completions { shell, out }) => completions::handle(*shell, out.as_deref()),
        None => {
            let mut cmd = build_cli_command();
            cmd.print_help().map_err(anyhow::Error::from)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
