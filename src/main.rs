//! Local music library catalogue and DJ-set tooling: scanning,
//! compatibility queries, playlist sequencing, and sidecar catalogue
//! imports, all driven from the `cratectl` CLI.

pub mod catalogue;
pub mod cli;
pub mod compatibility;
pub mod config;
pub mod discovery;
pub mod error;
pub mod extractor;
pub mod fingerprint;
pub mod importer;
pub mod model;
pub mod scanner;
pub mod sequencer;
pub mod similarity;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::from_default_env().add_directive("cratectl=info".parse().unwrap()))
        .init();

    let config = config::load();
    let code = cli::run(cli, config).await;
    std::process::exit(code);
}
