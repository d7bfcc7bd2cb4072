//! `compat` / `compat-export` subcommands: rank catalogued tracks by
//! compatibility against a seed track.

use std::path::PathBuf;

use clap::Args;

use crate::catalogue::CandidateFilters;
use crate::compatibility::{rank, RankedCandidate};
use crate::config::Config;
use crate::error::{Error, Result};

#[derive(Debug, Args)]
pub struct CompatArgs {
    #[arg(long)]
    pub path: String,

    #[arg(long, default_value_t = 20)]
    pub top: usize,

    #[arg(long)]
    pub prefer_relative: bool,
}

#[derive(Debug, Args)]
pub struct CompatExportArgs {
    #[command(flatten)]
    pub compat: CompatArgs,

    #[arg(long)]
    pub out: PathBuf,
}

async fn ranked_against_catalogue(
    args: &CompatArgs,
    db: Option<&PathBuf>,
    config: &Config,
) -> Result<(Vec<RankedCandidate>, usize)> {
    let catalogue = super::open_catalogue(db, config).await?;

    let seed = catalogue
        .get_candidate(&args.path)
        .await?
        .ok_or_else(|| Error::not_found(format!("{} is not in the catalogue", args.path)))?;

    let candidates = catalogue
        .query_candidates(
            seed.bpm.unwrap_or(0.0),
            &CandidateFilters {
                bpm_tolerance: None,
                genre: None,
                max_results: 0,
            },
        )
        .await?
        .into_iter()
        .filter(|c| c.path != seed.path)
        .map(|c| (c.path.clone(), c.scoring_view()))
        .collect::<Vec<_>>();

    rank(&args.path, &seed.scoring_view(), &candidates, args.top, args.prefer_relative)
}

pub async fn run_stdout(args: &CompatArgs, db: Option<&PathBuf>, config: &Config) -> Result<()> {
    let (ranked, dropped) = ranked_against_catalogue(args, db, config).await?;
    for candidate in &ranked {
        let bpm = candidate.view.bpm.map(|b| format!("{b:.1}")).unwrap_or_default();
        let key = candidate.view.camelot_key.clone().unwrap_or_default();
        let energy = candidate.view.energy.map(|e| format!("{e:.3}")).unwrap_or_default();
        println!("{}|{bpm}|{key}|{energy}|{:.4}", candidate.path, candidate.score);
    }
    if dropped > 0 {
        tracing::info!("{dropped} candidates dropped for missing bpm");
    }
    Ok(())
}

pub async fn run_export(args: &CompatExportArgs, db: Option<&PathBuf>, config: &Config) -> Result<()> {
    let (ranked, _) = ranked_against_catalogue(&args.compat, db, config).await?;

    let mut writer = csv::Writer::from_path(&args.out)
        .map_err(|e| Error::validation(format!("could not create {}: {e}", args.out.display())))?;
    writer
        .write_record(["path", "score"])
        .map_err(|e| Error::validation(e.to_string()))?;
    for candidate in &ranked {
        writer
            .write_record([candidate.path.as_str(), &format!("{:.6}", candidate.score)])
            .map_err(|e| Error::validation(e.to_string()))?;
    }
    writer.flush().map_err(Error::Io)?;
    Ok(())
}
