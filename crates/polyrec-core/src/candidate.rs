//! # Candidate Providers
//!
//! Refinement consumes candidate replacement values from a
//! [`CandidateProvider`]. The engine is agnostic to how candidates are
//! produced: a deterministic test double, a learned scorer, or the default
//! [`SeededCandidateProvider`] all plug in through the same trait.
//!
//! ## Contract
//!
//! - Same request, same candidates (the nonce is the only entropy source)
//! - Candidates come back sorted by descending score
//! - Every candidate is tagged with the requested dimension

use crate::oscillation::OscillationMap;
use crate::primitives::{DEFAULT_CANDIDATE_SPREAD, EULER_TARGET};
use crate::types::{Dimension, SearchCandidate, StructuralMap};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

// =============================================================================
// TRAIT
// =============================================================================

/// Everything a provider may look at when proposing candidates.
#[derive(Debug, Clone, Copy)]
pub struct CandidateRequest<'a> {
    pub nonce: u64,
    pub dimension: Dimension,
    pub count: usize,
    pub structure: &'a StructuralMap,
    pub oscillations: Option<&'a OscillationMap>,
}

/// Source of scored replacement values for one count field.
pub trait CandidateProvider {
    /// Propose up to `request.count` candidates, best first.
    fn generate(&self, request: &CandidateRequest<'_>) -> Vec<SearchCandidate>;
}

impl<F> CandidateProvider for F
where
    F: Fn(&CandidateRequest<'_>) -> Vec<SearchCandidate>,
{
    fn generate(&self, request: &CandidateRequest<'_>) -> Vec<SearchCandidate> {
        self(request)
    }
}

// =============================================================================
// SEEDED PROVIDER
// =============================================================================

/// Default provider: proposes values around the exact Euler correction.
///
/// For a dimension with current count `c` and characteristic `χ`, the value
/// that restores `χ = 2` is `c + (2 - χ)` for vertices and faces and
/// `c - (2 - χ)` for edges. The first candidate is that value; the rest are
/// offset by a ChaCha20 draw within `±spread`. Values never drop below 1.
#[derive(Debug, Clone, PartialEq)]
pub struct SeededCandidateProvider {
    pub spread: u32,
    pub stability_bonus: f64,
}

impl Default for SeededCandidateProvider {
    fn default() -> Self {
        Self {
            spread: DEFAULT_CANDIDATE_SPREAD,
            stability_bonus: 0.1,
        }
    }
}

impl SeededCandidateProvider {
    #[must_use]
    pub const fn new(spread: u32, stability_bonus: f64) -> Self {
        Self {
            spread,
            stability_bonus,
        }
    }

    fn correction_target(structure: &StructuralMap, dimension: Dimension) -> i64 {
        let correction = EULER_TARGET - structure.euler_characteristic();
        i64::from(structure.count(dimension)) + dimension.euler_sign() * correction
    }
}

impl CandidateProvider for SeededCandidateProvider {
    fn generate(&self, request: &CandidateRequest<'_>) -> Vec<SearchCandidate> {
        let mut rng = ChaCha20Rng::seed_from_u64(request.nonce);
        let target = Self::correction_target(request.structure, request.dimension);
        let spread = i64::from(self.spread);

        let mut candidates: Vec<SearchCandidate> = (0..request.count)
            .map(|i| {
                let offset = if i == 0 || spread == 0 {
                    0
                } else {
                    rng.gen_range(-spread..=spread)
                };
                let value = (target + offset).max(1) as u64;
                let mut candidate = SearchCandidate::new(request.dimension, value, 0.0);
                candidate.score = score_candidate(
                    &candidate,
                    request.structure,
                    request.oscillations,
                    self.stability_bonus,
                );
                candidate
            })
            .collect();

        sort_by_score(&mut candidates);
        tracing::trace!(
            nonce = request.nonce,
            dimension = %request.dimension,
            target,
            proposed = candidates.len(),
            "seeded candidates"
        );
        candidates
    }
}

// =============================================================================
// SCORING HELPERS
// =============================================================================

/// `1 / (1 + |χ' - 2|)` for the characteristic after substitution, times
/// `1 + stability_bonus` when the dimension's signature is stable.
#[must_use]
pub fn score_candidate(
    candidate: &SearchCandidate,
    structure: &StructuralMap,
    oscillations: Option<&OscillationMap>,
    stability_bonus: f64,
) -> f64 {
    let current = i64::from(structure.count(candidate.dimension));
    let proposed = i64::try_from(candidate.value).unwrap_or(i64::MAX);
    let shift = candidate.dimension.euler_sign() * (proposed.saturating_sub(current));
    let chi = structure.euler_characteristic().saturating_add(shift);
    let delta = chi.saturating_sub(EULER_TARGET).unsigned_abs();

    let mut score = 1.0 / (1.0 + delta as f64);
    if oscillations.is_some_and(|map| map.is_stable(candidate.dimension.index())) {
        score *= 1.0 + stability_bonus;
    }
    score
}

/// Re-score in place and sort best first.
pub fn score_and_sort(
    candidates: &mut [SearchCandidate],
    structure: &StructuralMap,
    oscillations: Option<&OscillationMap>,
    stability_bonus: f64,
) {
    for candidate in candidates.iter_mut() {
        candidate.score = score_candidate(candidate, structure, oscillations, stability_bonus);
    }
    sort_by_score(candidates);
}

/// Stable sort by descending score.
pub fn sort_by_score(candidates: &mut [SearchCandidate]) {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
}

/// One candidate list per dimension, in tag order. Each dimension gets its
/// own nonce derived from `nonce` so the lists are independent.
pub fn candidates_for_all_dimensions(
    provider: &dyn CandidateProvider,
    nonce: u64,
    per_dimension: usize,
    structure: &StructuralMap,
    oscillations: Option<&OscillationMap>,
) -> [Vec<SearchCandidate>; 3] {
    Dimension::ALL.map(|dimension| {
        provider.generate(&CandidateRequest {
            nonce: nonce.wrapping_add(dimension.index() as u64),
            dimension,
            count: per_dimension,
            structure,
            oscillations,
        })
    })
}

#[must_use]
pub fn best_candidate(candidates: &[SearchCandidate]) -> Option<&SearchCandidate> {
    candidates
        .iter()
        .reduce(|best, c| if c.score > best.score { c } else { best })
}

/// Mean score; zero for an empty slice.
#[must_use]
pub fn average_score(candidates: &[SearchCandidate]) -> f64 {
    if candidates.is_empty() {
        return 0.0;
    }
    candidates.iter().map(|c| c.score).sum::<f64>() / candidates.len() as f64
}

/// The `n` best candidates, best first.
#[must_use]
pub fn select_top(candidates: &[SearchCandidate], n: usize) -> Vec<SearchCandidate> {
    let mut sorted = candidates.to_vec();
    sort_by_score(&mut sorted);
    sorted.truncate(n);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oscillation::OscillationSignature;

    fn request(
        structure: &StructuralMap,
        dimension: Dimension,
        nonce: u64,
    ) -> CandidateRequest<'_> {
        CandidateRequest {
            nonce,
            dimension,
            count: 6,
            structure,
            oscillations: None,
        }
    }

    fn stable_map(stable: [bool; 3]) -> OscillationMap {
        OscillationMap {
            signatures: stable
                .iter()
                .enumerate()
                .map(|(dimension, &is_stable)| OscillationSignature {
                    dimension,
                    frequency: 0.0,
                    amplitude: 0.0,
                    phase: 0.0,
                    period: 0,
                    is_stable,
                    convergence_rate: 0.0,
                })
                .collect(),
            cross_correlations: vec![vec![1.0; 3]; 3],
            is_converging: true,
            iterations_to_convergence: 0,
        }
    }

    #[test]
    fn first_candidate_is_exact_correction() {
        // cube with two edges lost: 8 - 10 + 6 = 4
        let cube = StructuralMap::new(8, 10, 6);
        let candidates =
            SeededCandidateProvider::default().generate(&request(&cube, Dimension::Edge, 1));
        assert_eq!(candidates.len(), 6);
        assert_eq!(candidates[0].value, 12);
        assert_eq!(candidates[0].score, 1.0);
        assert!(candidates.iter().all(|c| c.dimension == Dimension::Edge));
    }

    #[test]
    fn vertex_and_face_targets_move_the_other_way() {
        // 8 - 12 + 4 = 0: needs two more faces or two more vertices
        let map = StructuralMap::new(8, 12, 4);
        let provider = SeededCandidateProvider::default();
        let faces = provider.generate(&request(&map, Dimension::Face, 3));
        assert_eq!(faces[0].value, 6);
        let vertices = provider.generate(&request(&map, Dimension::Vertex, 3));
        assert_eq!(vertices[0].value, 10);
    }

    #[test]
    fn same_nonce_same_candidates() {
        let map = StructuralMap::new(8, 10, 6);
        let provider = SeededCandidateProvider::new(5, 0.0);
        let a = provider.generate(&request(&map, Dimension::Edge, 42));
        let b = provider.generate(&request(&map, Dimension::Edge, 42));
        assert_eq!(a, b);
    }

    #[test]
    fn candidates_are_sorted_and_within_spread() {
        let map = StructuralMap::new(8, 10, 6);
        let provider = SeededCandidateProvider::new(3, 0.0);
        let candidates = provider.generate(&request(&map, Dimension::Edge, 9));
        for pair in candidates.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert!(candidates.iter().all(|c| (9..=15).contains(&c.value)));
    }

    #[test]
    fn values_never_drop_below_one() {
        // 1 - 5 + 1 = -3, face target is 1 + 5 = 6; edge target is 5 - 5 = 0
        let map = StructuralMap::new(1, 5, 1);
        let provider = SeededCandidateProvider::new(4, 0.0);
        let candidates = provider.generate(&request(&map, Dimension::Edge, 11));
        assert!(candidates.iter().all(|c| c.value >= 1));
    }

    #[test]
    fn stable_dimension_gets_bonus() {
        let map = StructuralMap::new(8, 10, 6);
        let oscillations = stable_map([false, true, false]);
        let candidate = SearchCandidate::new(Dimension::Edge, 12, 0.0);
        let plain = score_candidate(&candidate, &map, None, 0.5);
        let boosted = score_candidate(&candidate, &map, Some(&oscillations), 0.5);
        assert_eq!(plain, 1.0);
        assert_eq!(boosted, 1.5);

        let face = SearchCandidate::new(Dimension::Face, 4, 0.0);
        assert_eq!(score_candidate(&face, &map, Some(&oscillations), 0.5), 1.0);
    }

    fn fixed_seven(req: &CandidateRequest<'_>) -> Vec<SearchCandidate> {
        vec![SearchCandidate::new(req.dimension, 7, 1.0)]
    }

    #[test]
    fn functions_are_providers() {
        let map = StructuralMap::new(4, 6, 4);
        let provider: &dyn CandidateProvider = &fixed_seven;
        let out = provider.generate(&request(&map, Dimension::Face, 0));
        assert_eq!(out, vec![SearchCandidate::new(Dimension::Face, 7, 1.0)]);
    }

    #[test]
    fn all_dimensions_are_covered() {
        let map = StructuralMap::new(8, 10, 6);
        let provider = SeededCandidateProvider::default();
        let lists = candidates_for_all_dimensions(&provider, 5, 4, &map, None);
        for (dimension, list) in Dimension::ALL.iter().zip(&lists) {
            assert_eq!(list.len(), 4);
            assert!(list.iter().all(|c| c.dimension == *dimension));
        }
    }

    #[test]
    fn ranking_helpers() {
        let mut candidates = vec![
            SearchCandidate::new(Dimension::Vertex, 1, 0.2),
            SearchCandidate::new(Dimension::Vertex, 2, 0.9),
            SearchCandidate::new(Dimension::Vertex, 3, 0.4),
        ];
        assert_eq!(best_candidate(&candidates).map(|c| c.value), Some(2));
        assert!((average_score(&candidates) - 0.5).abs() < 1e-12);
        let top = select_top(&candidates, 2);
        assert_eq!(top.iter().map(|c| c.value).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(average_score(&[]), 0.0);
        assert!(best_candidate(&[]).is_none());

        // vertex count 3 lands closest to the invariant
        let tetra = StructuralMap::new(4, 6, 4);
        score_and_sort(&mut candidates, &tetra, None, 0.0);
        assert_eq!(candidates[0].value, 3);
    }
}
