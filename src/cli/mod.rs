//! Command-line interface for the catalogue engine: scanning, neighbor
//! queries, playlist generation, and sidecar catalogue imports.

mod commands;

pub use commands::{run, Cli, Commands};
