//! Row types returned directly from `sqlx` queries.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::error::{Error, Result};
use crate::model::{AnalysisResult, Hamms, ScanSession, SessionStatus};
use crate::similarity::ScoringView;

/// A `tracks` row as read back from the catalogue.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TrackRow {
    pub path: String,
    pub fingerprint: Vec<u8>,
    pub size: i64,
    pub mtime: f64,
    pub status: String,
    pub last_verified: String,
    pub has_complete_data: bool,
}

/// A joined `tracks`/`analysis_results` row carrying everything the
/// Similarity Engine needs to score a candidate, plus its ISRC for
/// playlist dedup.
#[derive(Debug, Clone)]
pub struct CandidateRow {
    pub path: String,
    pub bpm: Option<f64>,
    pub camelot_key: Option<String>,
    pub energy: Option<f64>,
    pub hamms: Option<Hamms>,
    pub isrc: Option<String>,
    pub duration_seconds: Option<f64>,
}

impl CandidateRow {
    pub fn scoring_view(&self) -> ScoringView {
        ScoringView {
            bpm: self.bpm,
            camelot_key: self.camelot_key.clone(),
            energy: self.energy,
            hamms: self.hamms,
        }
    }
}

pub fn candidate_from_row(row: &SqliteRow) -> CandidateRow {
    let hamms_json: Option<String> = row.try_get::<Option<String>, _>("hamms").ok().flatten();
    let hamms = hamms_json.and_then(|s| serde_json::from_str::<Hamms>(&s).ok());
    CandidateRow {
        path: row.get("path"),
        bpm: row.get("bpm"),
        camelot_key: row.get("camelot_key"),
        energy: row.get("energy"),
        hamms,
        isrc: row.get("isrc"),
        duration_seconds: row.get("duration_seconds"),
    }
}

/// Full `analysis_results` row, for merging a sidecar [`crate::model::DjMeta`]
/// overlay onto an existing extractor-derived analysis.
pub fn analysis_from_row(row: &SqliteRow) -> Result<AnalysisResult> {
    let hamms_json: Option<String> = row.try_get::<Option<String>, _>("hamms").ok().flatten();
    let hamms = hamms_json.and_then(|s| serde_json::from_str::<Hamms>(&s).ok());
    let analyzed_at: String = row.get("analyzed_at");

    Ok(AnalysisResult {
        bpm: row.get("bpm"),
        initial_key: row.get("initial_key"),
        camelot_key: row.get("camelot_key"),
        energy: row.get("energy"),
        hamms,
        genre: row.get("genre"),
        subgenre: row.get("subgenre"),
        era: row.get("era"),
        mood: row.get("mood"),
        isrc: row.get("isrc"),
        duration_seconds: row.get("duration_seconds"),
        analysis_method: row.get("analysis_method"),
        confidence: row.get("confidence"),
        analyzed_at: parse_timestamp(&analyzed_at)?,
        scan_session_id: row.get("scan_session_id"),
    })
}

pub fn session_from_row(row: &SqliteRow) -> Result<ScanSession> {
    let mode: String = row.get("mode");
    let status: String = row.get("status");
    let started_at: String = row.get("started_at");
    let ended_at: Option<String> = row.get("ended_at");

    Ok(ScanSession {
        id: row.get("id"),
        started_at: parse_timestamp(&started_at)?,
        ended_at: ended_at.map(|s| parse_timestamp(&s)).transpose()?,
        root_path: row.get("root_path"),
        mode: mode.parse().map_err(|_| Error::integrity(format!("unknown scan mode: {mode}")))?,
        status: parse_session_status(&status),
        discovered: row.get::<i64, _>("discovered") as u64,
        processed: row.get::<i64, _>("processed") as u64,
        cached: row.get::<i64, _>("cached") as u64,
        analyzed: row.get::<i64, _>("analyzed") as u64,
        skipped: row.get::<i64, _>("skipped") as u64,
        error: row.get::<i64, _>("error") as u64,
        peak_memory_mb: row.get::<i64, _>("peak_memory_mb") as u64,
        duration_seconds: row.get("duration_seconds"),
        error_message: row.get("error_message"),
    })
}

fn parse_timestamp(s: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| Error::integrity(format!("bad timestamp {s}: {e}")))
}

fn parse_session_status(s: &str) -> SessionStatus {
    use std::str::FromStr;
    SessionStatus::from_str(s).unwrap_or(SessionStatus::Running)
}
