//! `import-mik` / `import-rekordbox` / `import-traktor`: apply a sidecar
//! DJ-software catalogue as a [`crate::model::DjMeta`] overlay onto
//! already-catalogued tracks.

use std::path::PathBuf;

use clap::Args;

use crate::config::Config;
use crate::error::Result;
use crate::importer::mik_csv::MikCsvImporter;
use crate::importer::rekordbox_xml::RekordboxXmlImporter;
use crate::importer::traktor_nml::TraktorNmlImporter;
use crate::importer::{ExternalCatalogueImporter, ImportOutcome};

#[derive(Debug, Args)]
pub struct ImportMikArgs {
    #[arg(long)]
    pub csv: PathBuf,

    #[arg(long)]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ImportRekordboxArgs {
    #[arg(long)]
    pub xml: PathBuf,

    #[arg(long)]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ImportTraktorArgs {
    #[arg(long)]
    pub nml: PathBuf,

    #[arg(long)]
    pub root: Option<PathBuf>,
}

async fn apply(outcome: ImportOutcome, db: Option<&PathBuf>, config: &Config) -> Result<()> {
    let catalogue = super::open_catalogue(db, config).await?;

    let mut matched = 0usize;
    let mut unmatched = 0usize;
    for entry in &outcome.entries {
        if catalogue.apply_dj_meta(&entry.path, &entry.meta).await? {
            matched += 1;
        } else {
            unmatched += 1;
            tracing::debug!("{} not in catalogue, DJMeta overlay skipped", entry.path);
        }
    }

    println!(
        "parsed {} rows ({} skipped as malformed); {matched} matched a catalogued track, {unmatched} did not",
        outcome.entries.len() + outcome.skipped,
        outcome.skipped
    );
    Ok(())
}

pub async fn run_mik(args: &ImportMikArgs, db: Option<&PathBuf>, config: &Config) -> Result<()> {
    let outcome = MikCsvImporter.import(&args.csv, args.root.as_deref())?;
    apply(outcome, db, config).await
}

pub async fn run_rekordbox(args: &ImportRekordboxArgs, db: Option<&PathBuf>, config: &Config) -> Result<()> {
    let outcome = RekordboxXmlImporter.import(&args.xml, args.root.as_deref())?;
    apply(outcome, db, config).await
}

pub async fn run_traktor(args: &ImportTraktorArgs, db: Option<&PathBuf>, config: &Config) -> Result<()> {
    let outcome = TraktorNmlImporter.import(&args.nml, args.root.as_deref())?;
    apply(outcome, db, config).await
}
