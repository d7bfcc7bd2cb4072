//! Playlist Sequencer: greedy constrained selection with energy-curve
//! shaping, progressive tolerance fallback, and post-generation
//! validation.
//!
//! The fallback cascade (stages A through D) is modeled as an explicit
//! state machine rather than exception-driven control flow, mirroring
//! `services/playlist.py`'s `generate_playlist` stage order.

use crate::error::{Error, Result};
use crate::similarity::{camelot_distance, tempo_within_tolerance, transition_score, ScoringView};

/// Candidate pool curve shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyCurve {
    Ascending,
    Descending,
    Flat,
}

/// Target energy per playlist position for a curve of the given length.
/// Ascending: linear 0..1; descending: linear 1..0; flat: 0.5 everywhere.
pub fn energy_curve(length: usize, curve: EnergyCurve) -> Vec<f64> {
    if length == 0 {
        return Vec::new();
    }
    let denom = (length.saturating_sub(1)).max(1) as f64;
    (0..length)
        .map(|i| match curve {
            EnergyCurve::Flat => 0.5,
            EnergyCurve::Ascending => (i as f64 / denom).min(1.0),
            EnergyCurve::Descending => (1.0 - i as f64 / denom).max(0.0),
        })
        .collect()
}

/// Explicit fallback-cascade stage, modeled as a finite state machine
/// rather than nested conditionals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistState {
    Init,
    Seeded,
    SelectingStageA,
    SelectingStageB,
    SelectingStageC,
    SelectingStageD,
    Complete,
    TruncatedEmpty,
}

/// A candidate track as seen by the sequencer: its scoring view plus
/// identity and, when ISRC dedup is enabled, its ISRC.
#[derive(Debug, Clone)]
pub struct SequencerCandidate {
    pub path: String,
    pub view: ScoringView,
    pub isrc: Option<String>,
    pub duration_seconds: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct SequencerConfig {
    pub length: usize,
    pub curve: EnergyCurve,
    pub bpm_tolerance: f64,
    pub prefer_relative: bool,
    pub dedup_isrc: bool,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            length: 10,
            curve: EnergyCurve::Ascending,
            bpm_tolerance: 0.15,
            prefer_relative: false,
            dedup_isrc: false,
        }
    }
}

/// One transition's tolerance-compliance outcome.
#[derive(Debug, Clone)]
pub struct TransitionViolation {
    pub position: usize,
    pub from_bpm: Option<f64>,
    pub to_bpm: Option<f64>,
}

/// Post-generation validation report.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub violations: Vec<TransitionViolation>,
    pub total_transitions: usize,
    pub compliance_rate: f64,
}

/// Result of [`generate`]: the ordered plan, the terminal state, a drop
/// count for bpm-less candidates, and the validation report.
#[derive(Debug, Clone)]
pub struct SequencerOutcome {
    pub plan: Vec<SequencerCandidate>,
    pub terminal_state: PlaylistState,
    pub dropped_without_bpm: usize,
    pub validation: ValidationReport,
}

const ADAPTIVE_LOW: f64 = 0.25;
const ADAPTIVE_MID_LOW: f64 = 0.20;
const ADAPTIVE_MID: f64 = 0.15;
const ADAPTIVE_HIGH: f64 = 0.12;

/// `bpm < 90 -> 0.25, < 110 -> 0.20, < 140 -> 0.15, else -> 0.12`
fn adaptive_tolerance(bpm: f64) -> f64 {
    if bpm < 90.0 {
        ADAPTIVE_LOW
    } else if bpm < 110.0 {
        ADAPTIVE_MID_LOW
    } else if bpm < 140.0 {
        ADAPTIVE_MID
    } else {
        ADAPTIVE_HIGH
    }
}

/// Top-100 compatible candidates against `current`, ranked by
/// [`transition_score`] descending. Mirrors Compatibility Query's
/// ranking without its error-on-no-bpm seed behavior, since `current`
/// is guaranteed to carry a bpm by construction here.
fn ranked_pool<'a>(
    current: &ScoringView,
    pool: &'a [SequencerCandidate],
    prefer_relative: bool,
) -> Vec<&'a SequencerCandidate> {
    let mut scored: Vec<(&SequencerCandidate, f64)> = pool
        .iter()
        .filter(|c| c.view.bpm.is_some())
        .filter_map(|c| transition_score(current, &c.view, prefer_relative).ok().map(|s| (c, s)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(100);
    scored.into_iter().map(|(c, _)| c).collect()
}

/// Run stages A through D against `ranked` (already truncated to the
/// top 100), returning the surviving set and the stage it was produced
/// by, or `None` if every stage is empty.
fn fallback_cascade<'a>(
    current: &ScoringView,
    ranked: &[&'a SequencerCandidate],
    tolerance: f64,
) -> Option<(Vec<&'a SequencerCandidate>, PlaylistState)> {
    // Stage A: strict camelot distance <= 2 and within the requested tolerance.
    let stage_a: Vec<&SequencerCandidate> = ranked
        .iter()
        .filter(|c| {
            let dist = camelot_distance(current.camelot_key.as_deref(), c.view.camelot_key.as_deref());
            (dist.is_none() || dist.unwrap() <= 2.0)
                && tempo_within_tolerance(current.bpm, c.view.bpm, tolerance)
        })
        .copied()
        .collect();
    if !stage_a.is_empty() {
        return Some((stage_a, PlaylistState::SelectingStageA));
    }

    // Stage B: adaptive tempo tolerance, no key constraint.
    let adaptive = current.bpm.map(adaptive_tolerance).unwrap_or(tolerance);
    let stage_b: Vec<&SequencerCandidate> = ranked
        .iter()
        .filter(|c| tempo_within_tolerance(current.bpm, c.view.bpm, adaptive))
        .copied()
        .collect();
    if !stage_b.is_empty() {
        return Some((stage_b, PlaylistState::SelectingStageB));
    }

    // Stage C: excellent key, relaxed tempo.
    let stage_c: Vec<&SequencerCandidate> = ranked
        .iter()
        .filter(|c| {
            camelot_distance(current.camelot_key.as_deref(), c.view.camelot_key.as_deref())
                .is_some_and(|d| d <= 1.0)
        })
        .copied()
        .collect();
    if !stage_c.is_empty() {
        return Some((stage_c, PlaylistState::SelectingStageC));
    }

    // Stage D: emergency - within 40% bpm from the top-10, else top-2 outright.
    let Some(current_bpm) = current.bpm else {
        return None;
    };
    let top10 = &ranked[..ranked.len().min(10)];
    let emergency: Vec<&SequencerCandidate> = top10
        .iter()
        .filter(|c| {
            c.view
                .bpm
                .is_some_and(|bpm| (bpm - current_bpm).abs() / current_bpm <= 0.4)
        })
        .copied()
        .collect();
    if !emergency.is_empty() {
        return Some((emergency, PlaylistState::SelectingStageD));
    }
    if !ranked.is_empty() {
        tracing::warn!("sequencer stage D falling back to top-2 ranked candidates unconstrained");
        return Some((ranked[..ranked.len().min(2)].to_vec(), PlaylistState::SelectingStageD));
    }
    None
}

/// Generate an ordered sequence of length `config.length` starting with
/// `seed`. Returns a [`SequencerOutcome`] even when the cascade
/// terminates early (`TruncatedEmpty`); the partial plan is returned.
pub fn generate(
    seed_path: &str,
    seed: ScoringView,
    seed_isrc: Option<String>,
    seed_duration: Option<f64>,
    candidates: Vec<SequencerCandidate>,
    config: &SequencerConfig,
) -> Result<SequencerOutcome> {
    if config.length < 2 {
        return Err(Error::validation("playlist length must be >= 2".to_string()));
    }
    if !(0.0..=1.0).contains(&config.bpm_tolerance) || config.bpm_tolerance <= 0.0 {
        return Err(Error::validation(
            "bpm_tolerance must be in (0, 1]".to_string(),
        ));
    }
    if seed.bpm.is_none() {
        return Err(Error::validation(format!("seed track {seed_path} has no bpm")));
    }

    let total_candidates = candidates.len();
    let valid: Vec<SequencerCandidate> = candidates.into_iter().filter(|c| c.view.bpm.is_some()).collect();
    let dropped_without_bpm = total_candidates - valid.len();

    let curve_vals = energy_curve(config.length, config.curve);
    let reuse_allowed = valid.len() <= config.length;

    let mut plan = vec![SequencerCandidate {
        path: seed_path.to_string(),
        view: seed.clone(),
        isrc: seed_isrc,
        duration_seconds: seed_duration,
    }];
    let mut used: Vec<String> = vec![seed_path.to_string()];
    let mut used_isrcs: Vec<String> = plan[0].isrc.iter().cloned().collect();

    let mut state = PlaylistState::Seeded;
    let mut current = seed;

    for i in 1..config.length {
        let pool: Vec<SequencerCandidate> = valid
            .iter()
            .filter(|c| {
                let already_used = if reuse_allowed {
                    used.last().map(|last| last == &c.path).unwrap_or(false)
                } else {
                    used.contains(&c.path)
                };
                let isrc_dup = config.dedup_isrc
                    && c.isrc
                        .as_ref()
                        .is_some_and(|isrc| used_isrcs.iter().any(|u| u == isrc));
                !already_used && !isrc_dup
            })
            .cloned()
            .collect();

        let ranked = ranked_pool(&current, &pool, config.prefer_relative);
        if ranked.is_empty() {
            state = PlaylistState::TruncatedEmpty;
            break;
        }

        let Some((survivors, stage_state)) = fallback_cascade(&current, &ranked, config.bpm_tolerance) else {
            state = PlaylistState::TruncatedEmpty;
            break;
        };
        state = stage_state;

        let target_energy = curve_vals.get(i).copied().unwrap_or(0.5);
        let mut scored: Vec<(&SequencerCandidate, f64, f64)> = survivors
            .into_iter()
            .map(|c| {
                let energy = c.view.energy.unwrap_or(0.5);
                let t = transition_score(&current, &c.view, config.prefer_relative).unwrap_or(0.0);
                (c, (energy - target_energy).abs(), -t)
            })
            .collect();
        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal))
        });

        let chosen = scored[0].0.clone();
        used.push(chosen.path.clone());
        if let Some(ref isrc) = chosen.isrc {
            used_isrcs.push(isrc.clone());
        }
        current = chosen.view.clone();
        plan.push(chosen);
    }

    if state != PlaylistState::TruncatedEmpty {
        state = PlaylistState::Complete;
    }

    let validation = validate_tolerance(&plan, config.bpm_tolerance);

    Ok(SequencerOutcome {
        plan,
        terminal_state: state,
        dropped_without_bpm,
        validation,
    })
}

/// Walk consecutive pairs and report `tol(prev.bpm, next.bpm, t)`
/// violations; never fails on violations, only reports them.
pub fn validate_tolerance(plan: &[SequencerCandidate], tolerance: f64) -> ValidationReport {
    if plan.len() < 2 {
        return ValidationReport {
            violations: Vec::new(),
            total_transitions: 0,
            compliance_rate: 1.0,
        };
    }

    let mut violations = Vec::new();
    let total_transitions = plan.len() - 1;

    for i in 1..plan.len() {
        let prev = &plan[i - 1];
        let next = &plan[i];
        if !tempo_within_tolerance(prev.view.bpm, next.view.bpm, tolerance) {
            violations.push(TransitionViolation {
                position: i,
                from_bpm: prev.view.bpm,
                to_bpm: next.view.bpm,
            });
        }
    }

    let compliance_rate = if total_transitions > 0 {
        1.0 - violations.len() as f64 / total_transitions as f64
    } else {
        1.0
    };

    ValidationReport {
        violations,
        total_transitions,
        compliance_rate,
    }
}
