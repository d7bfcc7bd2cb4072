//! `AudioFeatureExtractor`: the external collaborator that turns a path
//! into tempo/key/energy/HAMMS features. The DSP itself is someone
//! else's concern; this module only defines the capability boundary and
//! a mock implementation for tests, following the trait-plus-mock
//! pattern used elsewhere in this codebase.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::Hamms;

/// Raw feature bundle an extractor returns for one path. Field names
/// mirror [`crate::model::AnalysisResult`] minus the catalogue-owned
/// bookkeeping (`analyzed_at`, `scan_session_id`).
#[derive(Debug, Clone, Default)]
pub struct ExtractedFeatures {
    pub bpm: Option<f64>,
    pub initial_key: Option<String>,
    pub camelot_key: Option<String>,
    pub energy: Option<f64>,
    pub hamms: Option<Hamms>,
    pub duration_s: Option<f64>,
    pub tags: HashMap<String, String>,
    pub confidence: Option<f64>,
}

/// Capability boundary for audio feature extraction. Never placed on
/// the scanner's hot path directly - the Orchestrator always calls this
/// behind a bounded-parallel `buffer_unordered` stage.
#[async_trait]
pub trait AudioFeatureExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<ExtractedFeatures>;
}

/// Configurable in-process mock used by orchestrator/sequencer tests.
/// Returns a deterministic feature set derived from the path unless a
/// specific path has been pre-seeded, so tests can assert stable
/// fixtures without depending on real DSP.
#[derive(Debug, Clone, Default)]
pub struct MockExtractor {
    seeded: HashMap<String, ExtractedFeatures>,
    fail_on: Vec<String>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(mut self, path: impl Into<String>, features: ExtractedFeatures) -> Self {
        self.seeded.insert(path.into(), features);
        self
    }

    pub fn fail_on(mut self, path: impl Into<String>) -> Self {
        self.fail_on.push(path.into());
        self
    }
}

#[async_trait]
impl AudioFeatureExtractor for MockExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedFeatures> {
        let key = path.to_string_lossy().to_string();
        if self.fail_on.contains(&key) {
            return Err(Error::extractor(format!("mock extraction failure for {key}")));
        }
        if let Some(features) = self.seeded.get(&key) {
            return Ok(features.clone());
        }
        Ok(ExtractedFeatures {
            bpm: Some(120.0),
            camelot_key: Some("8A".to_string()),
            energy: Some(0.5),
            hamms: Some([0.5; 12]),
            duration_s: Some(210.0),
            confidence: Some(0.9),
            ..Default::default()
        })
    }
}
