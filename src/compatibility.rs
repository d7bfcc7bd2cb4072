//! Compatibility Query: ranked neighbor search against a reference
//! track, using the Similarity Engine's composite transition score.

use crate::error::{Error, Result};
use crate::similarity::{transition_score, ScoringView};

/// A scored candidate, as returned by [`rank`].
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub path: String,
    pub score: f64,
    pub view: ScoringView,
}

/// Rank `candidates` against `seed` by composite transition score,
/// descending, truncated to `limit`. The seed must carry a BPM; a
/// missing seed BPM is a hard error. Candidates
/// without a BPM are dropped and counted, not errored.
pub fn rank(
    seed_path: &str,
    seed: &ScoringView,
    candidates: &[(String, ScoringView)],
    limit: usize,
    prefer_relative: bool,
) -> Result<(Vec<RankedCandidate>, usize)> {
    if seed.bpm.is_none() {
        return Err(Error::validation(format!(
            "seed track {seed_path} has no bpm; compatibility query requires one"
        )));
    }

    let mut dropped = 0usize;
    let mut scored = Vec::with_capacity(candidates.len());

    for (path, view) in candidates {
        if view.bpm.is_none() {
            dropped += 1;
            continue;
        }
        let score = transition_score(seed, view, prefer_relative)?;
        scored.push(RankedCandidate {
            path: path.clone(),
            score,
            view: view.clone(),
        });
    }

    // Descending score, stable tie-break by path.
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
    });
    scored.truncate(limit);

    Ok((scored, dropped))
}
