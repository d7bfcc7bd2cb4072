//! CLI argument surface and command dispatch.

mod compat;
mod import;
mod playlist;
mod scan;
mod summary;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::catalogue::{CataloguePool, CatalogueOptions};
use crate::config::Config;
use crate::error::Result;

#[derive(Debug, Parser)]
#[command(name = "cratectl", version, about = "Local music library catalogue and DJ-set tooling")]
pub struct Cli {
    /// Override the configured catalogue database path.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Discover audio files under a root and analyze cache misses.
    Scan(scan::ScanArgs),

    /// Rank catalogued tracks by compatibility against a seed track.
    Compat(compat::CompatArgs),

    /// Same ranking as `compat`, written to a CSV file instead of stdout.
    CompatExport(compat::CompatExportArgs),

    /// Playlist sequencing.
    Playlist(playlist::PlaylistArgs),

    /// Import a MixedInKey-style CSV export into the catalogue overlay.
    ImportMik(import::ImportMikArgs),

    /// Import a Rekordbox collection XML export into the catalogue overlay.
    ImportRekordbox(import::ImportRekordboxArgs),

    /// Import a Traktor collection NML export into the catalogue overlay.
    ImportTraktor(import::ImportTraktorArgs),

    /// Print catalogue-wide summary statistics.
    Summary(summary::SummaryArgs),
}

/// Resolve the catalogue path from `--db`, falling back to config, and
/// open it. Shared by every subcommand that touches the catalogue.
async fn open_catalogue(db_override: Option<&PathBuf>, config: &Config) -> Result<CataloguePool> {
    let db_path = db_override.cloned().unwrap_or_else(|| config.catalogue.db_path.clone());
    let options = CatalogueOptions {
        pool_size: config.catalogue.pool_size,
        mmap_mib: config.catalogue.mmap_mib,
        page_cache_pages: config.catalogue.page_cache_pages,
    };
    CataloguePool::open(&db_path, &options).await
}

/// Dispatch to the requested subcommand. Returns the process exit code;
/// never panics on user-facing errors, they are logged and mapped to 1.
pub async fn run(cli: Cli, config: Config) -> i32 {
    let result = match &cli.command {
        Commands::Scan(args) => scan::run(args, cli.db.as_ref(), &config).await,
        Commands::Compat(args) => compat::run_stdout(args, cli.db.as_ref(), &config).await,
        Commands::CompatExport(args) => compat::run_export(args, cli.db.as_ref(), &config).await,
        Commands::Playlist(args) => playlist::run(args, cli.db.as_ref(), &config).await,
        Commands::ImportMik(args) => import::run_mik(args, cli.db.as_ref(), &config).await,
        Commands::ImportRekordbox(args) => import::run_rekordbox(args, cli.db.as_ref(), &config).await,
        Commands::ImportTraktor(args) => import::run_traktor(args, cli.db.as_ref(), &config).await,
        Commands::Summary(args) => summary::run(args, cli.db.as_ref(), &config).await,
    };

    match result {
        Ok(()) => 0,
        Err(crate::error::Error::Cancelled) => 130,
        Err(e) => {
            tracing::error!("{e}");
            1
        }
    }
}
