//! Core data models for the catalogue.
//!
//! Defines the primary entities: [`Track`], [`AnalysisResult`],
//! [`ScanSession`], and the sidecar overlay [`DjMeta`]. These map onto
//! the `tracks`, `analysis_results`, and `scan_sessions` tables created
//! by the migrations under `migrations/`.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{Error, Result};

static CAMELOT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(1[0-2]|[1-9])([AB])$").unwrap());
static ISRC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2}-[A-Z0-9]{3}-\d{2}-\d{5}$").unwrap());

/// Validate a Camelot code against `NN{A|B}`, NN in 1..12.
pub fn is_valid_camelot(code: &str) -> bool {
    CAMELOT_RE.is_match(code)
}

/// Validate an ISRC against `^[A-Z]{2}-[A-Z0-9]{3}-\d{2}-\d{5}$`.
pub fn is_valid_isrc(code: &str) -> bool {
    ISRC_RE.is_match(code)
}

/// Lifecycle status of a [`Track`] row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackStatus {
    /// File is present on disk (or assumed present until an orphan sweep
    /// proves otherwise).
    Active,
    /// An orphan sweep could not find the file at its recorded path.
    Missing,
}

impl TrackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackStatus::Active => "active",
            TrackStatus::Missing => "missing",
        }
    }
}

impl std::str::FromStr for TrackStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "missing" => TrackStatus::Missing,
            _ => TrackStatus::Active,
        })
    }
}

/// Scan mode requested for a [`ScanSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Always re-analyze every discovered path.
    Full,
    /// Analyze only paths absent from the catalogue.
    Incremental,
    /// Analyze when absent, stale, or incomplete (the default).
    Smart,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::Full => "full",
            ScanMode::Incremental => "incremental",
            ScanMode::Smart => "smart",
        }
    }
}

impl std::str::FromStr for ScanMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "full" => ScanMode::Full,
            "incremental" => ScanMode::Incremental,
            "smart" => ScanMode::Smart,
            other => return Err(Error::validation(format!("unknown scan mode: {other}"))),
        })
    }
}

/// Terminal or in-flight status of a [`ScanSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    Completed,
    Cancelled,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Error => "error",
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "completed" => SessionStatus::Completed,
            "cancelled" => SessionStatus::Cancelled,
            "error" => SessionStatus::Error,
            _ => SessionStatus::Running,
        })
    }
}

/// A discovered audio file, identified by its canonical absolute path.
#[derive(Debug, Clone)]
pub struct Track {
    pub path: String,
    pub fingerprint: Vec<u8>,
    pub size: u64,
    pub mtime: f64,
    pub status: TrackStatus,
    pub last_verified: chrono::DateTime<chrono::Utc>,
}

/// The 12-dimensional harmonic/mood embedding. Every element must be in
/// `[0, 1]`.
pub type Hamms = [f64; 12];

/// Validate a HAMMS vector: exactly 12 elements, each in
/// `[0, 1]`. Contract violations are programmer errors, not data quirks,
/// so they are reported as `Validation`.
pub fn validate_hamms(v: &[f64]) -> Result<Hamms> {
    if v.len() != 12 {
        return Err(Error::validation(format!(
            "hamms vector must have 12 elements, got {}",
            v.len()
        )));
    }
    if v.iter().any(|x| !(0.0..=1.0).contains(x)) {
        return Err(Error::validation(
            "hamms vector elements must be in [0, 1]".to_string(),
        ));
    }
    let mut out = [0.0; 12];
    out.copy_from_slice(v);
    Ok(out)
}

/// Per-track analysis output, 1:1 with [`Track`].
#[derive(Debug, Clone, Default)]
pub struct AnalysisResult {
    pub bpm: Option<f64>,
    pub initial_key: Option<String>,
    pub camelot_key: Option<String>,
    pub energy: Option<f64>,
    pub hamms: Option<Hamms>,
    pub genre: Option<String>,
    pub subgenre: Option<String>,
    pub era: Option<String>,
    pub mood: Option<String>,
    pub isrc: Option<String>,
    pub duration_seconds: Option<f64>,
    pub analysis_method: String,
    pub confidence: Option<f64>,
    pub analyzed_at: chrono::DateTime<chrono::Utc>,
    pub scan_session_id: Option<i64>,
}

impl AnalysisResult {
    /// `has_complete_data`: bpm, camelot_key, and energy are all present.
    /// Backs the partial indexes over `analysis_results`.
    pub fn has_complete_data(&self) -> bool {
        self.bpm.is_some() && self.camelot_key.is_some() && self.energy.is_some()
    }

    /// Validate and normalize the result before it is persisted. Invalid
    /// optional fields are *not* rejected wholesale: an
    /// ISRC failing its regex is stored as null rather than failing the
    /// whole write, but a malformed HAMMS length or an out-of-range BPM
    /// is a hard validation failure.
    pub fn validated(mut self) -> Result<Self> {
        if let Some(bpm) = self.bpm
            && !(bpm > 0.0 && bpm <= 300.0)
        {
            return Err(Error::validation(format!("bpm out of range (0, 300]: {bpm}")));
        }
        if let Some(ref key) = self.camelot_key
            && !is_valid_camelot(key)
        {
            return Err(Error::validation(format!("invalid camelot key: {key}")));
        }
        if let Some(ref energy) = self.energy
            && !(0.0..=1.0).contains(energy)
        {
            return Err(Error::validation(format!("energy out of range [0, 1]: {energy}")));
        }
        if let Some(ref isrc) = self.isrc
            && !is_valid_isrc(isrc)
        {
            self.isrc = None;
        }
        Ok(self)
    }
}

/// A single invocation of the Scanner Orchestrator.
#[derive(Debug, Clone)]
pub struct ScanSession {
    pub id: i64,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub root_path: String,
    pub mode: ScanMode,
    pub status: SessionStatus,
    pub discovered: u64,
    pub processed: u64,
    pub cached: u64,
    pub analyzed: u64,
    pub skipped: u64,
    pub error: u64,
    pub peak_memory_mb: u64,
    pub duration_seconds: f64,
    pub error_message: Option<String>,
}

/// Sidecar overlay written by an `ExternalCatalogueImporter`. Merge rule: DJMeta fields override extractor-derived fields when
/// present.
#[derive(Debug, Clone, Default)]
pub struct DjMeta {
    pub bpm: Option<f64>,
    pub initial_key: Option<String>,
    pub camelot_key: Option<String>,
    /// 1..10, converted to `energy = clamp(level / 10, 0, 1)`.
    pub energy_level: Option<i32>,
    pub comment: Option<String>,
}

impl DjMeta {
    /// `energy_level / 10`, clamped to `[0, 1]`.
    pub fn energy(&self) -> Option<f64> {
        self.energy_level
            .map(|level| (level as f64 / 10.0).clamp(0.0, 1.0))
    }

    /// Apply this overlay onto an extractor-derived analysis: DJMeta
    /// fields win when present, extractor fields are preserved otherwise.
    pub fn merge_into(&self, base: &mut AnalysisResult) {
        if let Some(bpm) = self.bpm {
            base.bpm = Some(bpm);
        }
        if let Some(ref key) = self.initial_key {
            base.initial_key = Some(key.clone());
        }
        if let Some(ref camelot) = self.camelot_key {
            base.camelot_key = Some(camelot.clone());
        }
        if let Some(energy) = self.energy() {
            base.energy = Some(energy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camelot_validation() {
        assert!(is_valid_camelot("8A"));
        assert!(is_valid_camelot("12B"));
        assert!(!is_valid_camelot("13A"));
        assert!(!is_valid_camelot("8C"));
        assert!(!is_valid_camelot("0A"));
    }

    #[test]
    fn test_isrc_validation() {
        assert!(is_valid_isrc("US-ABC-12-34567"));
        assert!(!is_valid_isrc("USABC1234567"));
        assert!(!is_valid_isrc("US-AB-12-34567"));
    }

    #[test]
    fn test_validate_hamms_rejects_wrong_length() {
        let v = vec![0.5; 11];
        assert!(validate_hamms(&v).is_err());
    }

    #[test]
    fn test_validate_hamms_rejects_out_of_range() {
        let mut v = vec![0.5; 12];
        v[3] = 1.5;
        assert!(validate_hamms(&v).is_err());
    }

    #[test]
    fn test_validate_hamms_accepts_valid() {
        let v = vec![0.1; 12];
        let h = validate_hamms(&v).unwrap();
        assert_eq!(h.len(), 12);
    }

    #[test]
    fn test_analysis_result_invalid_isrc_becomes_none() {
        let result = AnalysisResult {
            isrc: Some("not-an-isrc".to_string()),
            analysis_method: "test".to_string(),
            analyzed_at: chrono::Utc::now(),
            ..Default::default()
        }
        .validated()
        .unwrap();
        assert!(result.isrc.is_none());
    }

    #[test]
    fn test_analysis_result_out_of_range_bpm_rejected() {
        let result = AnalysisResult {
            bpm: Some(301.0),
            analysis_method: "test".to_string(),
            analyzed_at: chrono::Utc::now(),
            ..Default::default()
        }
        .validated();
        assert!(result.is_err());
    }

    #[test]
    fn test_has_complete_data() {
        let mut result = AnalysisResult {
            analysis_method: "test".to_string(),
            analyzed_at: chrono::Utc::now(),
            ..Default::default()
        };
        assert!(!result.has_complete_data());
        result.bpm = Some(120.0);
        result.camelot_key = Some("8A".to_string());
        result.energy = Some(0.5);
        assert!(result.has_complete_data());
    }

    #[test]
    fn test_dj_meta_energy_level_conversion() {
        let meta = DjMeta {
            energy_level: Some(7),
            ..Default::default()
        };
        assert_eq!(meta.energy(), Some(0.7));
    }

    #[test]
    fn test_dj_meta_merge_overrides_present_fields_only() {
        let mut base = AnalysisResult {
            bpm: Some(124.0),
            camelot_key: Some("5A".to_string()),
            analysis_method: "extractor".to_string(),
            analyzed_at: chrono::Utc::now(),
            ..Default::default()
        };
        let overlay = DjMeta {
            bpm: Some(128.0),
            ..Default::default()
        };
        overlay.merge_into(&mut base);
        assert_eq!(base.bpm, Some(128.0));
        // Extractor's camelot_key is preserved since the import didn't carry one.
        assert_eq!(base.camelot_key.as_deref(), Some("5A"));
    }
}
