//! `playlist generate`: constrained greedy playlist sequencing from a
//! seed track against the catalogue.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::catalogue::CandidateFilters;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::sequencer::{self, EnergyCurve, SequencerCandidate, SequencerConfig};

#[derive(Debug, Args)]
pub struct PlaylistArgs {
    #[command(subcommand)]
    pub action: PlaylistAction,
}

#[derive(Debug, Subcommand)]
pub enum PlaylistAction {
    Generate(GenerateArgs),
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    #[arg(long)]
    pub seed: String,

    #[arg(long)]
    pub length: Option<usize>,

    /// `ascending` | `descending` | `flat`.
    #[arg(long)]
    pub curve: Option<String>,

    #[arg(long)]
    pub bpm_tol: Option<f64>,

    #[arg(long)]
    pub prefer_relative: bool,

    #[arg(long)]
    pub out: Option<PathBuf>,
}

fn parse_curve(s: &str) -> Result<EnergyCurve> {
    Ok(match s {
        "ascending" => EnergyCurve::Ascending,
        "descending" => EnergyCurve::Descending,
        "flat" => EnergyCurve::Flat,
        other => return Err(Error::validation(format!("unknown energy curve: {other}"))),
    })
}

pub async fn run(args: &PlaylistArgs, db: Option<&PathBuf>, config: &Config) -> Result<()> {
    let PlaylistAction::Generate(generate_args) = &args.action;

    let catalogue = super::open_catalogue(db, config).await?;

    let seed_row = catalogue
        .get_candidate(&generate_args.seed)
        .await?
        .ok_or_else(|| Error::not_found(format!("{} is not in the catalogue", generate_args.seed)))?;

    let pool = catalogue
        .query_candidates(
            seed_row.bpm.unwrap_or(0.0),
            &CandidateFilters {
                bpm_tolerance: None,
                genre: None,
                max_results: 0,
            },
        )
        .await?
        .into_iter()
        .filter(|c| c.path != seed_row.path)
        .map(|c| SequencerCandidate {
            path: c.path.clone(),
            view: c.scoring_view(),
            isrc: c.isrc.clone(),
            duration_seconds: c.duration_seconds,
        })
        .collect::<Vec<_>>();

    let sequencer_config = SequencerConfig {
        length: generate_args.length.unwrap_or(config.playlist.length),
        curve: parse_curve(generate_args.curve.as_deref().unwrap_or(&config.playlist.curve))?,
        bpm_tolerance: generate_args.bpm_tol.unwrap_or(config.playlist.bpm_tolerance),
        prefer_relative: generate_args.prefer_relative || config.playlist.prefer_relative,
        dedup_isrc: seed_row.isrc.is_some(),
    };

    let outcome = sequencer::generate(
        &generate_args.seed,
        seed_row.scoring_view(),
        seed_row.isrc.clone(),
        seed_row.duration_seconds,
        pool,
        &sequencer_config,
    )?;

    tracing::info!(
        "playlist terminal state: {:?}, compliance rate {:.2}",
        outcome.terminal_state,
        outcome.validation.compliance_rate
    );
    if !outcome.validation.violations.is_empty() {
        tracing::warn!(
            "{} bpm-tolerance violations out of {} transitions",
            outcome.validation.violations.len(),
            outcome.validation.total_transitions
        );
    }

    match &generate_args.out {
        Some(path) if path.extension().and_then(|e| e.to_str()) == Some("csv") => {
            write_csv(path, &outcome.plan)?;
        }
        Some(path) => write_m3u(path, &outcome.plan)?,
        None => {
            for track in &outcome.plan {
                println!("{}", track.path);
            }
        }
    }

    Ok(())
}

fn write_m3u(path: &PathBuf, plan: &[SequencerCandidate]) -> Result<()> {
    use std::fmt::Write as _;
    let mut body = String::from("#EXTM3U\n");
    for track in plan {
        let bpm = track.view.bpm.unwrap_or(0.0);
        match track.duration_seconds {
            Some(duration) => {
                let _ = writeln!(body, "#EXTINF:{:.0},{bpm:.0} BPM", duration);
            }
            None => {
                let _ = writeln!(body, "#EXTINF:-1,{bpm:.0} BPM");
            }
        }
        let _ = writeln!(body, "{}", track.path);
    }
    std::fs::write(path, body).map_err(Error::Io)
}

fn write_csv(path: &PathBuf, plan: &[SequencerCandidate]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| Error::validation(format!("could not create {}: {e}", path.display())))?;
    writer
        .write_record(["position", "path", "bpm", "camelot_key", "energy"])
        .map_err(|e| Error::validation(e.to_string()))?;
    for (i, track) in plan.iter().enumerate() {
        writer
            .write_record([
                (i + 1).to_string(),
                track.path.clone(),
                track.view.bpm.map(|b| format!("{b:.2}")).unwrap_or_default(),
                track.view.camelot_key.clone().unwrap_or_default(),
                track.view.energy.map(|e| format!("{e:.3}")).unwrap_or_default(),
            ])
            .map_err(|e| Error::validation(e.to_string()))?;
    }
    writer.flush().map_err(Error::Io)
}
