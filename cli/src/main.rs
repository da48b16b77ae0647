#![deny(missing_docs)]

//! # Specmock CLI
//!
//! Command line front-end for the example generator.
//!
//! Supported Commands:
//! - `generate`: Writes one example document per operation of each spec.
//! - `resolve`: Prints (or writes) the fully resolved document.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::error::CliResult;

mod error;
mod generate;
mod resolve;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Swagger example generator")]
struct Cli {
    /// Log at debug level regardless of `RUST_LOG`.
    #[clap(long, short, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example documents for every operation.
    Generate(generate::GenerateArgs),
    /// Resolve a spec and print the normalized document.
    Resolve(resolve::ResolveArgs),
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Generate(args) => {
            generate::execute(args)?;
        }
        Commands::Resolve(args) => {
            resolve::execute(args)?;
        }
    }

    Ok(())
}
