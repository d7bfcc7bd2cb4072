//! The Similarity Engine: pairwise scores (HAMMS, Camelot, tempo,
//! energy) and the composite transition score.
//!
//! Formulas and constants mirror `services/compatibility.py`'s scoring
//! weights exactly.

use crate::error::{Error, Result};
use crate::model::Hamms;

/// `(number, letter)` parsed from a Camelot code like `8A`.
fn parse_camelot(code: &str) -> Option<(u32, char)> {
    if !crate::model::is_valid_camelot(code) {
        return None;
    }
    let letter = code.chars().last()?;
    let number: u32 = code[..code.len() - 1].parse().ok()?;
    Some((number, letter))
}

/// Ring distance plus a 0.5 mode penalty when letters differ.
pub fn camelot_distance(c1: Option<&str>, c2: Option<&str>) -> Option<f64> {
    let a = parse_camelot(c1?)?;
    let b = parse_camelot(c2?)?;
    let (n1, m1) = a;
    let (n2, m2) = b;
    let diff = n1.abs_diff(n2);
    let ring = diff.min(12 - diff);
    let mode_penalty = if m1 == m2 { 0.0 } else { 0.5 };
    Some(ring as f64 + mode_penalty)
}

/// Step function of [`camelot_distance`]. Missing key(s) -> neutral 0.5.
pub fn camelot_score(c1: Option<&str>, c2: Option<&str>) -> f64 {
    match camelot_distance(c1, c2) {
        None => 0.5,
        Some(d) if d == 0.0 => 1.0,
        Some(d) if d == 0.5 => 0.92,
        Some(d) if d <= 1.0 => 0.88,
        Some(d) if d <= 2.0 => 0.70,
        Some(d) if d <= 3.0 => 0.50,
        Some(_) => 0.20,
    }
}

/// `true` iff `c1`/`c2` share the same Camelot number but differ in
/// letter (relative major/minor).
pub fn is_relative_major_minor(c1: Option<&str>, c2: Option<&str>) -> bool {
    match (c1.and_then(parse_camelot), c2.and_then(parse_camelot)) {
        (Some((n1, m1)), Some((n2, m2))) => n1 == n2 && m1 != m2,
        _ => false,
    }
}

/// Best ratio among direct, double, and half tempo comparisons, stepped
/// into a compatibility score. Missing tempo(s) -> neutral 0.5.
pub fn tempo_score(b1: Option<f64>, b2: Option<f64>) -> f64 {
    let (Some(b1), Some(b2)) = (b1, b2) else {
        return 0.5;
    };
    if b1 <= 0.0 || b2 <= 0.0 {
        return 0.5;
    }

    let (lo, hi) = if b1 < b2 { (b1, b2) } else { (b2, b1) };
    let ratio = lo / hi;
    let doubled = 2.0 * lo;
    let ratio_double = doubled.min(hi) / doubled.max(hi);
    let best = ratio.max(ratio_double);

    if best >= 0.94 {
        1.0
    } else if best >= 0.92 {
        0.9
    } else if best >= 0.84 {
        0.75
    } else if best >= 0.75 {
        0.55
    } else {
        0.2
    }
}

/// `min(0.5, |e1 - e2| * 0.5)`; 0 if either is missing.
pub fn energy_penalty(e1: Option<f64>, e2: Option<f64>) -> f64 {
    match (e1, e2) {
        (Some(e1), Some(e2)) => (e1 - e2).abs() * 0.5,
        _ => 0.0,
    }
    .min(0.5)
}

/// `hamms(a,b) = max(0, 1 - Σ|a_i - b_i| / 2)`. Missing vector(s) ->
/// neutral 0.5.
pub fn hamms_score(a: Option<&Hamms>, b: Option<&Hamms>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => {
            let dist: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum();
            (1.0 - dist / 2.0).max(0.0)
        }
        _ => 0.5,
    }
}

/// Validate both vectors are 12-D, numeric, and in `[0, 1]` before
/// scoring. A contract violation (wrong shape), not a data quirk, so it
/// raises rather than degrading to neutral.
pub fn hamms_score_checked(a: &[f64], b: &[f64]) -> Result<f64> {
    let a = crate::model::validate_hamms(a)?;
    let b = crate::model::validate_hamms(b)?;
    Ok(hamms_score(Some(&a), Some(&b)))
}

/// True iff `b1`/`b2` fall within tolerance `t` (a ratio) of each other,
/// considering direct, double, and half tempo relationships.
pub fn tempo_within_tolerance(b1: Option<f64>, b2: Option<f64>, t: f64) -> bool {
    let (Some(b1), Some(b2)) = (b1, b2) else {
        return false;
    };
    if b1 <= 0.0 {
        return false;
    }

    let direct = (b1 - b2).abs() / b1;
    if direct <= t {
        return true;
    }
    let double = (b1 - 2.0 * b2).abs() / b1;
    if double <= t {
        return true;
    }
    let half = (b1 - b2 / 2.0).abs() / b1;
    if half <= t {
        return true;
    }
    let double2 = (2.0 * b1 - b2).abs() / (2.0 * b1);
    if double2 <= t {
        return true;
    }
    let half2 = (b1 / 2.0 - b2).abs() / (b1 / 2.0);
    half2 <= t
}

/// The subset of [`crate::model::AnalysisResult`] the Similarity Engine
/// scores against. Deliberately narrower than the full catalogue row so
/// callers (Compatibility Query, Sequencer) can build one cheaply.
#[derive(Debug, Clone, Default)]
pub struct ScoringView {
    pub bpm: Option<f64>,
    pub camelot_key: Option<String>,
    pub energy: Option<f64>,
    pub hamms: Option<Hamms>,
}

/// `T(a, b, prefer_rel)`: the composite transition score.
///
/// `base = clamp(0.4*key + 0.3*tempo + 0.3*hamms - epen, 0, 1)`. If
/// `prefer_rel` and the keys are relative major/minor, add 0.05 then
/// clamp to 1. Requires both tracks to carry a BPM;
/// callers that only have BPM-optional views should filter first.
pub fn transition_score(a: &ScoringView, b: &ScoringView, prefer_rel: bool) -> Result<f64> {
    if a.bpm.is_none() || b.bpm.is_none() {
        return Err(Error::validation(
            "transition_score requires both tracks to carry a bpm".to_string(),
        ));
    }

    let s_k = camelot_score(a.camelot_key.as_deref(), b.camelot_key.as_deref());
    let s_t = tempo_score(a.bpm, b.bpm);
    let s_h = hamms_score(a.hamms.as_ref(), b.hamms.as_ref());
    let pen = energy_penalty(a.energy, b.energy);

    let base = (0.4 * s_k + 0.3 * s_t + 0.3 * s_h - pen).clamp(0.0, 1.0);
    let with_bonus = if prefer_rel
        && is_relative_major_minor(a.camelot_key.as_deref(), b.camelot_key.as_deref())
    {
        base + 0.05
    } else {
        base
    };
    Ok(with_bonus.min(1.0))
}

/// Extra metadata the extended composite reasons about beyond the core
/// HAMMS/Camelot/tempo scores.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtendedProfile {
    pub subgenre: Option<String>,
    pub era: Option<String>,
    pub mood: Option<String>,
    pub cultural_tags: Vec<String>,
    pub lyrics_fingerprint: Option<String>,
}

/// Caller-supplied weights for the extended composite, normalized to
/// sum to 1 (after availability-based halving) inside
/// [`extended_composite`].
#[derive(Debug, Clone, Copy)]
pub struct ExtendedWeights {
    pub subgenre: f64,
    pub hamms: f64,
    pub era: f64,
    pub mood: f64,
    pub cultural: f64,
    pub lyrics: f64,
}

impl Default for ExtendedWeights {
    fn default() -> Self {
        Self {
            subgenre: 0.25,
            hamms: 0.25,
            era: 0.15,
            mood: 0.15,
            cultural: 0.10,
            lyrics: 0.10,
        }
    }
}

/// Bidirectional table-driven subgenre/era compatibility lookup. Missing
/// entries default to 0.3 (assumed cross-family) unless both sides share
/// the same label, which is treated as the 0.6 same-parent-genre
/// fallback.
fn table_compatibility(a: Option<&str>, b: Option<&str>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) if a.eq_ignore_ascii_case(b) => 1.0,
        (Some(_), Some(_)) => 0.3,
        _ => 0.6,
    }
}

fn mood_compatibility(a: Option<&str>, b: Option<&str>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) if a.eq_ignore_ascii_case(b) => 1.0,
        (Some(_), Some(_)) => 0.4,
        _ => 0.5,
    }
}

fn cultural_compatibility(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.5;
    }
    let shared = a.iter().filter(|tag| b.contains(tag)).count();
    let union = a.len().max(b.len());
    shared as f64 / union as f64
}

fn lyrics_compatibility(a: Option<&str>, b: Option<&str>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) if a == b => 1.0,
        (Some(_), Some(_)) => 0.4,
        _ => 0.5,
    }
}

/// Fraction of `pool` that carries a non-empty value for the given
/// extractor. Used to decide whether a feature source falls below the
/// 30% availability threshold.
fn availability<T>(pool: &[ExtendedProfile], extract: impl Fn(&ExtendedProfile) -> Option<T>) -> f64 {
    if pool.is_empty() {
        return 0.0;
    }
    let present = pool.iter().filter(|p| extract(p).is_some()).count();
    present as f64 / pool.len() as f64
}

const AVAILABILITY_THRESHOLD: f64 = 0.30;

/// Weighted sum over subgenre/HAMMS/era/mood/cultural/lyrics
/// compatibility. Any feature whose availability across `pool` falls
/// below 30% has its weight halved before the remaining weights are
/// re-normalized to sum to 1.
pub fn extended_composite(
    a: &ScoringView,
    a_profile: &ExtendedProfile,
    b: &ScoringView,
    b_profile: &ExtendedProfile,
    weights: ExtendedWeights,
    pool: &[ExtendedProfile],
) -> f64 {
    let subgenre_avail = availability(pool, |p| p.subgenre.clone());
    let era_avail = availability(pool, |p| p.era.clone());
    let mood_avail = availability(pool, |p| p.mood.clone());
    let cultural_avail = availability(pool, |p| (!p.cultural_tags.is_empty()).then_some(()));
    let lyrics_avail = availability(pool, |p| p.lyrics_fingerprint.clone());

    let halve_if_sparse = |w: f64, avail: f64| {
        if avail < AVAILABILITY_THRESHOLD {
            w / 2.0
        } else {
            w
        }
    };

    let w_subgenre = halve_if_sparse(weights.subgenre, subgenre_avail);
    let w_hamms = weights.hamms;
    let w_era = halve_if_sparse(weights.era, era_avail);
    let w_mood = halve_if_sparse(weights.mood, mood_avail);
    let w_cultural = halve_if_sparse(weights.cultural, cultural_avail);
    let w_lyrics = halve_if_sparse(weights.lyrics, lyrics_avail);

    let total = w_subgenre + w_hamms + w_era + w_mood + w_cultural + w_lyrics;
    let normalize = |w: f64| if total > 0.0 { w / total } else { 0.0 };

    let s_subgenre = table_compatibility(a_profile.subgenre.as_deref(), b_profile.subgenre.as_deref());
    let s_hamms = hamms_score(a.hamms.as_ref(), b.hamms.as_ref());
    let s_era = table_compatibility(a_profile.era.as_deref(), b_profile.era.as_deref());
    let s_mood = mood_compatibility(a_profile.mood.as_deref(), b_profile.mood.as_deref());
    let s_cultural = cultural_compatibility(&a_profile.cultural_tags, &b_profile.cultural_tags);
    let s_lyrics =
        lyrics_compatibility(a_profile.lyrics_fingerprint.as_deref(), b_profile.lyrics_fingerprint.as_deref());

    normalize(w_subgenre) * s_subgenre
        + normalize(w_hamms) * s_hamms
        + normalize(w_era) * s_era
        + normalize(w_mood) * s_mood
        + normalize(w_cultural) * s_cultural
        + normalize(w_lyrics) * s_lyrics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camelot_distance_same_letter() {
        assert_eq!(camelot_distance(Some("8A"), Some("8A")), Some(0.0));
        assert_eq!(camelot_distance(Some("8A"), Some("9A")), Some(1.0));
        assert_eq!(camelot_distance(Some("1A"), Some("12A")), Some(1.0));
    }

    #[test]
    fn test_camelot_distance_mode_penalty() {
        assert_eq!(camelot_distance(Some("8A"), Some("8B")), Some(0.5));
    }

    #[test]
    fn test_camelot_score_steps() {
        assert_eq!(camelot_score(Some("8A"), Some("8A")), 1.0);
        assert_eq!(camelot_score(Some("8A"), Some("8B")), 0.92);
        assert_eq!(camelot_score(Some("8A"), Some("9A")), 0.88);
        assert_eq!(camelot_score(None, Some("8A")), 0.5);
    }

    #[test]
    fn test_is_relative_major_minor() {
        assert!(is_relative_major_minor(Some("8A"), Some("8B")));
        assert!(!is_relative_major_minor(Some("8A"), Some("9B")));
    }

    #[test]
    fn test_tempo_score_exact_match() {
        assert_eq!(tempo_score(Some(128.0), Some(128.0)), 1.0);
    }

    #[test]
    fn test_tempo_score_double_time() {
        // 64 -> 128 is an exact double-time relationship.
        assert_eq!(tempo_score(Some(64.0), Some(128.0)), 1.0);
    }

    #[test]
    fn test_tempo_score_missing() {
        assert_eq!(tempo_score(None, Some(120.0)), 0.5);
    }

    #[test]
    fn test_energy_penalty_capped() {
        assert_eq!(energy_penalty(Some(0.0), Some(1.0)), 0.5);
        assert_eq!(energy_penalty(None, Some(1.0)), 0.0);
    }

    #[test]
    fn test_hamms_score_identical_vectors() {
        let v = [0.5; 12];
        assert_eq!(hamms_score(Some(&v), Some(&v)), 1.0);
    }

    #[test]
    fn test_hamms_score_checked_rejects_wrong_length() {
        let a = vec![0.5; 11];
        let b = vec![0.5; 12];
        assert!(hamms_score_checked(&a, &b).is_err());
    }

    #[test]
    fn test_tempo_within_tolerance_direct() {
        assert!(tempo_within_tolerance(Some(128.0), Some(130.0), 0.08));
        assert!(!tempo_within_tolerance(Some(128.0), Some(160.0), 0.08));
    }

    #[test]
    fn test_tempo_within_tolerance_half_double() {
        assert!(tempo_within_tolerance(Some(128.0), Some(64.0), 0.08));
        assert!(tempo_within_tolerance(Some(64.0), Some(128.0), 0.08));
    }

    #[test]
    fn test_transition_score_requires_bpm() {
        let a = ScoringView {
            bpm: None,
            ..Default::default()
        };
        let b = ScoringView {
            bpm: Some(120.0),
            ..Default::default()
        };
        assert!(transition_score(&a, &b, false).is_err());
    }

    #[test]
    fn test_transition_score_relative_major_minor_bonus() {
        let a = ScoringView {
            bpm: Some(120.0),
            camelot_key: Some("8A".to_string()),
            energy: Some(0.5),
            hamms: Some([0.5; 12]),
        };
        let b = ScoringView {
            bpm: Some(120.0),
            camelot_key: Some("8B".to_string()),
            energy: Some(0.5),
            hamms: Some([0.5; 12]),
        };
        let without_bonus = transition_score(&a, &b, false).unwrap();
        let with_bonus = transition_score(&a, &b, true).unwrap();
        assert!(with_bonus > without_bonus);
    }

    #[test]
    fn test_extended_composite_halves_sparse_feature_weight() {
        let a = ScoringView {
            bpm: Some(120.0),
            hamms: Some([0.5; 12]),
            ..Default::default()
        };
        let b = a.clone();
        let a_profile = ExtendedProfile {
            subgenre: Some("deep-house".to_string()),
            ..Default::default()
        };
        let b_profile = a_profile.clone();

        let sparse_pool = vec![ExtendedProfile::default(); 10];
        let score = extended_composite(
            &a,
            &a_profile,
            &b,
            &b_profile,
            ExtendedWeights::default(),
            &sparse_pool,
        );
        assert!(score > 0.0 && score <= 1.0);
    }
}
