//! `summary`: catalogue-wide track and session counts.

use std::path::PathBuf;

use clap::Args;
use sqlx::Row;

use crate::config::Config;
use crate::error::{Error, Result};

#[derive(Debug, Args)]
pub struct SummaryArgs {
    /// Write the per-status breakdown to a CSV file instead of stdout.
    #[arg(long)]
    pub csv: Option<PathBuf>,
}

pub async fn run(args: &SummaryArgs, db: Option<&PathBuf>, config: &Config) -> Result<()> {
    let catalogue = super::open_catalogue(db, config).await?;
    let pool = catalogue.pool();

    let active: i64 = sqlx::query("SELECT COUNT(*) AS n FROM tracks WHERE status = 'active'")
        .fetch_one(pool)
        .await
        .map_err(Error::Database)?
        .get("n");
    let missing: i64 = sqlx::query("SELECT COUNT(*) AS n FROM tracks WHERE status = 'missing'")
        .fetch_one(pool)
        .await
        .map_err(Error::Database)?
        .get("n");
    let complete: i64 = sqlx::query("SELECT COUNT(*) AS n FROM tracks WHERE has_complete_data = 1")
        .fetch_one(pool)
        .await
        .map_err(Error::Database)?
        .get("n");
    let sessions: i64 = sqlx::query("SELECT COUNT(*) AS n FROM scan_sessions")
        .fetch_one(pool)
        .await
        .map_err(Error::Database)?
        .get("n");
    let avg_bpm: Option<f64> = sqlx::query("SELECT AVG(bpm) AS n FROM analysis_results WHERE bpm IS NOT NULL")
        .fetch_one(pool)
        .await
        .map_err(Error::Database)?
        .get("n");
    let avg_energy: Option<f64> =
        sqlx::query("SELECT AVG(energy) AS n FROM analysis_results WHERE energy IS NOT NULL")
            .fetch_one(pool)
            .await
            .map_err(Error::Database)?
            .get("n");
    let top_keys: Vec<(String, i64)> = sqlx::query(
        "SELECT camelot_key, COUNT(*) AS n FROM analysis_results
         WHERE camelot_key IS NOT NULL
         GROUP BY camelot_key ORDER BY n DESC, camelot_key ASC LIMIT 5",
    )
    .fetch_all(pool)
    .await
    .map_err(Error::Database)?
    .iter()
    .map(|row| (row.get("camelot_key"), row.get("n")))
    .collect();

    match &args.csv {
        Some(path) => {
            let mut writer = csv::Writer::from_path(path)
                .map_err(|e| Error::validation(format!("could not create {}: {e}", path.display())))?;
            writer
                .write_record(["metric", "count"])
                .map_err(|e| Error::validation(e.to_string()))?;
            for (metric, count) in [
                ("active", active),
                ("missing", missing),
                ("complete", complete),
                ("sessions", sessions),
            ] {
                writer
                    .write_record([metric, &count.to_string()])
                    .map_err(|e| Error::validation(e.to_string()))?;
            }
            writer
                .write_record(["avg_bpm", &avg_bpm.map(|v| format!("{v:.2}")).unwrap_or_default()])
                .map_err(|e| Error::validation(e.to_string()))?;
            writer
                .write_record(["avg_energy", &avg_energy.map(|v| format!("{v:.3}")).unwrap_or_default()])
                .map_err(|e| Error::validation(e.to_string()))?;
            for (key, count) in &top_keys {
                writer
                    .write_record([&format!("top_key:{key}"), &count.to_string()])
                    .map_err(|e| Error::validation(e.to_string()))?;
            }
            writer.flush().map_err(Error::Io)?;
        }
        None => {
            println!("active tracks:   {active}");
            println!("missing tracks:  {missing}");
            println!("complete rows:   {complete}");
            println!("scan sessions:   {sessions}");
            println!(
                "average bpm:     {}",
                avg_bpm.map(|v| format!("{v:.2}")).unwrap_or_else(|| "-".to_string())
            );
            println!(
                "average energy:  {}",
                avg_energy.map(|v| format!("{v:.3}")).unwrap_or_else(|| "-".to_string())
            );
            if top_keys.is_empty() {
                println!("top camelot keys: none");
            } else {
                println!("top camelot keys:");
                for (key, count) in &top_keys {
                    println!("  {key}: {count}");
                }
            }
        }
    }

    Ok(())
}
