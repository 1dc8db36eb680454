/*!

This is the command line interface for bringing up Amazon EKS clusters.

!*/

mod create;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, Subcommand};
use env_logger::Builder;
use log::LevelFilter;
use std::collections::BTreeSet;

/// The command line interface for creating EKS clusters.
#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Args {
    /// Set logging verbosity [trace|debug|info|warn|error]. If the environment variable `RUST_LOG`
    /// is present, it overrides the default logging behavior. See https://docs.rs/env_logger/latest
    #[clap(long = "log-level", default_value = "info")]
    log_level: LevelFilter,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create resources.
    Create(create::Create),
}

#[tokio::main]
async fn main() {
    let matches = match Args::command().try_get_matches() {
        Ok(matches) => matches,
        Err(e) => usage_error(e),
    };
    let args = match Args::from_arg_matches(&matches) {
        Ok(args) => args,
        Err(e) => usage_error(e),
    };
    init_logger(args.log_level);
    if let Err(e) = run(args, &matches).await {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

/// Help and version requests exit successfully, every other parse error exits with 1 like any
/// other failure.
fn usage_error(e: clap::Error) -> ! {
    match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
        _ => {
            // Printing can only fail if stderr is gone.
            let _ = e.print();
            std::process::exit(1)
        }
    }
}

async fn run(args: Args, matches: &ArgMatches) -> Result<()> {
    match args.command {
        Command::Create(create) => create.run(explicitly_set(matches)).await,
    }
}

/// The long names of the arguments of the innermost subcommand that were given on the command
/// line rather than defaulted.
fn explicitly_set(matches: &ArgMatches) -> BTreeSet<String> {
    let mut matches = matches;
    while let Some((_, sub_matches)) = matches.subcommand() {
        matches = sub_matches;
    }
    matches
        .ids()
        .filter(|id| matches.value_source(id.as_str()) == Some(ValueSource::CommandLine))
        .map(|id| id.as_str().replace('_', "-"))
        .collect()
}

/// Initialize the logger with the value passed by `--log-level` (or its default) when the
/// `RUST_LOG` environment variable is not present. If present, the `RUST_LOG` environment variable
/// overrides `--log-level`/`level`.
fn init_logger(level: LevelFilter) {
    match std::env::var(env_logger::DEFAULT_FILTER_ENV).ok() {
        Some(_) => {
            // RUST_LOG exists; env_logger will use it.
            Builder::from_default_env().init();
        }
        None => {
            // RUST_LOG does not exist; use default log level for our crates only.
            Builder::new()
                .filter(Some(env!("CARGO_CRATE_NAME")), level)
                .filter(Some("eksup_model"), level)
                .filter(Some("eksup_aws"), level)
                .init();
        }
    }
}
