//! # Iterative Refinement
//!
//! Applies candidate count replacements to a [`StructuralMap`], keeping only
//! those that do not worsen the Euler invariant.
//!
//! ## Acceptance Rule
//!
//! A candidate is applied inside a `CountTransaction`: the field is
//! overwritten, the new invariant delta `|V - E + F - 2|` is compared with
//! the delta before the write, and the transaction either commits
//! (`new <= old`) or rolls the field back when it is dropped. Every exit
//! path that does not commit restores the saved value.
//!
//! A write that keeps or lowers the delta but shrinks `V + E + F` enough to
//! raise `delta / (V + E + F)` is also rolled back, so the corruption rate
//! never rises within a pass.
//!
//! ## Termination
//!
//! A single pass sweeps all candidates per iteration and stops when:
//! - two consecutive sweeps leave the corruption rate within the threshold
//!   (`Converged`)
//! - a sweep changes nothing (`Stalled`)
//! - the iteration cap is reached (`Exhausted`)

use crate::candidate::{CandidateProvider, CandidateRequest};
use crate::config::RefinementConfig;
use crate::oscillation::OscillationMap;
use crate::primitives::{EULER_TARGET, PASS_NONCE_MULTIPLIER};
use crate::types::{
    Dimension, PolyrecError, PolyrecResult, SearchCandidate, StructuralMap, corruption_ratio,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

// =============================================================================
// SEARCH STATE
// =============================================================================

/// Candidates and limits for one refinement pass.
#[derive(Debug, Clone, PartialEq)]
pub struct IterativeSearch {
    candidates: Vec<SearchCandidate>,
    pub max_iterations: u32,
    pub convergence_threshold: f64,
    pub nonce: u64,
}

impl IterativeSearch {
    pub fn new(
        max_iterations: u32,
        convergence_threshold: f64,
        nonce: u64,
    ) -> PolyrecResult<Self> {
        if !(convergence_threshold.is_finite() && convergence_threshold >= 0.0) {
            return Err(PolyrecError::InvalidThreshold(convergence_threshold));
        }
        Ok(Self {
            candidates: Vec::new(),
            max_iterations,
            convergence_threshold,
            nonce,
        })
    }

    /// Candidates are applied in the order given.
    #[must_use]
    pub fn with_candidates(mut self, candidates: Vec<SearchCandidate>) -> Self {
        self.candidates = candidates;
        self
    }

    #[must_use]
    pub fn candidates(&self) -> &[SearchCandidate] {
        &self.candidates
    }
}

// =============================================================================
// TRANSACTION
// =============================================================================

/// A pending write to one count field. Rolls back on drop unless committed.
struct CountTransaction<'a> {
    structure: &'a mut StructuralMap,
    dimension: Dimension,
    previous: u32,
    committed: bool,
}

impl<'a> CountTransaction<'a> {
    fn begin(structure: &'a mut StructuralMap, dimension: Dimension, value: u32) -> Self {
        let previous = structure.count(dimension);
        structure.set_count(dimension, value);
        Self {
            structure,
            dimension,
            previous,
            committed: false,
        }
    }

    fn new_delta(&self) -> u64 {
        self.structure.invariant_delta()
    }

    /// Delta before the write, derived from the saved value.
    fn old_delta(&self) -> u64 {
        let written = i64::from(self.structure.count(self.dimension));
        let shift = self.dimension.euler_sign() * (written - i64::from(self.previous));
        (self.structure.euler_characteristic() - shift - EULER_TARGET).unsigned_abs()
    }

    /// `V + E + F` before the write.
    fn old_total(&self) -> u64 {
        self.structure.total_elements() - u64::from(self.structure.count(self.dimension))
            + u64::from(self.previous)
    }

    fn raises_corruption(&self, new_delta: u64, old_delta: u64) -> bool {
        corruption_ratio(new_delta, self.structure.total_elements())
            > corruption_ratio(old_delta, self.old_total())
    }

    fn changed(&self) -> bool {
        self.structure.count(self.dimension) != self.previous
    }

    fn commit(mut self) {
        self.structure.recompute_corruption();
        self.committed = true;
    }
}

impl Drop for CountTransaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.structure.set_count(self.dimension, self.previous);
        }
    }
}

// =============================================================================
// SINGLE CANDIDATE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The value does not fit a `u32` count.
    OutOfRange,
    /// The write would increase `|V - E + F - 2|`.
    WorsensInvariant,
    /// The delta holds but the smaller total raises the corruption rate.
    RaisesCorruption,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOutcome {
    /// Committed. `changed` is false when the value equalled the current one.
    Accepted { changed: bool, delta: u64 },
    Rejected(RejectReason),
}

/// Apply one candidate, committing only if neither the invariant delta nor
/// the corruption rate rises.
pub fn apply_candidate(
    structure: &mut StructuralMap,
    candidate: &SearchCandidate,
) -> CandidateOutcome {
    let Ok(value) = u32::try_from(candidate.value) else {
        tracing::warn!(
            dimension = %candidate.dimension,
            value = candidate.value,
            "candidate out of range"
        );
        return CandidateOutcome::Rejected(RejectReason::OutOfRange);
    };

    let tx = CountTransaction::begin(structure, candidate.dimension, value);
    let new_delta = tx.new_delta();
    let old_delta = tx.old_delta();
    if new_delta > old_delta {
        return CandidateOutcome::Rejected(RejectReason::WorsensInvariant);
    }
    if tx.raises_corruption(new_delta, old_delta) {
        return CandidateOutcome::Rejected(RejectReason::RaisesCorruption);
    }
    let changed = tx.changed();
    tx.commit();
    CandidateOutcome::Accepted {
        changed,
        delta: new_delta,
    }
}

// =============================================================================
// SINGLE PASS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepTermination {
    Converged,
    Stalled,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementOutcome {
    pub termination: SweepTermination,
    /// Sweeps performed.
    pub iterations: u32,
    /// Accepted candidates that changed a count.
    pub accepted: usize,
    /// Corruption rate after each sweep.
    pub history: Vec<f64>,
}

impl RefinementOutcome {
    #[must_use]
    pub fn converged(&self) -> bool {
        self.termination == SweepTermination::Converged
    }
}

/// Sweep the search's candidates over `structure` until convergence, stall,
/// or the iteration cap.
pub fn refine_structure(
    structure: &mut StructuralMap,
    search: &IterativeSearch,
) -> RefinementOutcome {
    let mut history = Vec::new();
    let mut accepted = 0;
    let mut previous: Option<f64> = None;
    let mut termination = SweepTermination::Exhausted;
    let mut iterations = 0;

    while iterations < search.max_iterations {
        iterations += 1;
        let changes = search
            .candidates
            .iter()
            .filter(|candidate| {
                matches!(
                    apply_candidate(structure, candidate),
                    CandidateOutcome::Accepted { changed: true, .. }
                )
            })
            .count();
        accepted += changes;

        let current = structure.corruption_percentage;
        history.push(current);
        tracing::debug!(
            nonce = search.nonce,
            iteration = iterations,
            changes,
            corruption = current,
            delta = structure.invariant_delta(),
            "refinement sweep"
        );

        if previous.is_some_and(|p| (current - p).abs() < search.convergence_threshold) {
            termination = SweepTermination::Converged;
            break;
        }
        if changes == 0 {
            termination = SweepTermination::Stalled;
            break;
        }
        previous = Some(current);
    }

    RefinementOutcome {
        termination,
        iterations,
        accepted,
        history,
    }
}

// =============================================================================
// MULTI PASS
// =============================================================================

/// Nonce of multi-pass round `pass`.
#[must_use]
pub const fn pass_nonce(pass: u32) -> u64 {
    PASS_NONCE_MULTIPLIER.wrapping_mul(pass as u64 + 1)
}

/// Run up to `config.num_passes` rounds, cycling vertex, edge, face.
///
/// Each round asks `provider` for candidates of its dimension and runs a
/// single pass capped at `config.inner_iterations`. Returns whether any
/// round converged. A structure that already satisfies the invariant is
/// converged without consulting the provider.
pub fn refine_structure_multi_pass(
    structure: &mut StructuralMap,
    oscillations: Option<&OscillationMap>,
    provider: &dyn CandidateProvider,
    config: &RefinementConfig,
) -> bool {
    if structure.satisfies_invariant() {
        structure.recompute_corruption();
        tracing::debug!("structure already satisfies the invariant");
        return true;
    }
    for pass in 0..config.num_passes {
        let nonce = pass_nonce(pass);
        let dimension = Dimension::ALL[(pass % 3) as usize];
        let mut candidates = provider.generate(&CandidateRequest {
            nonce,
            dimension,
            count: config.candidates_per_pass,
            structure,
            oscillations,
        });

        let proposed = candidates.len();
        candidates.retain(|c| c.dimension == dimension);
        if candidates.len() != proposed {
            tracing::warn!(
                pass,
                %dimension,
                dropped = proposed - candidates.len(),
                "provider returned candidates for another dimension"
            );
        }

        let search = IterativeSearch {
            candidates,
            max_iterations: config.inner_iterations,
            convergence_threshold: config.convergence_threshold,
            nonce,
        };
        let outcome = refine_structure(structure, &search);
        tracing::debug!(
            pass,
            %dimension,
            termination = ?outcome.termination,
            accepted = outcome.accepted,
            "refinement pass"
        );
        if outcome.converged() {
            tracing::info!(pass, delta = structure.invariant_delta(), "refinement converged");
            return true;
        }
    }
    false
}

// =============================================================================
// CONVERGENCE CHECKS
// =============================================================================

/// The invariant holds and the corruption rate is below `threshold`.
#[must_use]
pub fn is_structure_converged(structure: &StructuralMap, threshold: f64) -> bool {
    structure.satisfies_invariant() && structure.corruption_percentage < threshold
}

/// Bounded window of recent quality scores.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceHistory {
    window: VecDeque<f64>,
    capacity: usize,
}

impl ConvergenceHistory {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a score, evicting the oldest once the window is full.
    pub fn push(&mut self, score: f64) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(score);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.window.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    #[must_use]
    pub fn latest(&self) -> Option<f64> {
        self.window.back().copied()
    }

    /// Population variance of the window; zero when empty.
    #[must_use]
    pub fn variance(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let n = self.window.len() as f64;
        let mean = self.window.iter().sum::<f64>() / n;
        self.window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
    }

    /// Latest score at least `threshold` and window variance at most
    /// `variance_threshold`.
    #[must_use]
    pub fn is_converged(&self, threshold: f64, variance_threshold: f64) -> bool {
        self.latest()
            .is_some_and(|latest| latest >= threshold && self.variance() <= variance_threshold)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn search(candidates: Vec<SearchCandidate>, max_iterations: u32) -> IterativeSearch {
        IterativeSearch::new(max_iterations, 0.01, 7)
            .expect("valid threshold")
            .with_candidates(candidates)
    }

    #[test]
    fn improving_candidate_is_committed() {
        let mut map = StructuralMap::new(8, 10, 6);
        let outcome = apply_candidate(&mut map, &SearchCandidate::new(Dimension::Edge, 12, 1.0));
        assert_eq!(
            outcome,
            CandidateOutcome::Accepted {
                changed: true,
                delta: 0
            }
        );
        assert_eq!(map.num_edges, 12);
        assert_eq!(map.corruption_percentage, 0.0);
    }

    #[test]
    fn worsening_candidate_is_rolled_back() {
        let mut map = StructuralMap::new(8, 10, 6);
        let before = map.clone();
        let outcome = apply_candidate(&mut map, &SearchCandidate::new(Dimension::Face, 9, 1.0));
        assert_eq!(
            outcome,
            CandidateOutcome::Rejected(RejectReason::WorsensInvariant)
        );
        assert_eq!(map, before);
    }

    #[test]
    fn out_of_range_candidate_is_not_applied() {
        let mut map = StructuralMap::new(4, 6, 4);
        let before = map.clone();
        let candidate = SearchCandidate::new(Dimension::Vertex, u64::from(u32::MAX) + 1, 1.0);
        assert_eq!(
            apply_candidate(&mut map, &candidate),
            CandidateOutcome::Rejected(RejectReason::OutOfRange)
        );
        assert_eq!(map, before);
    }

    #[test]
    fn equal_delta_is_accepted_when_the_rate_does_not_rise() {
        // 8 - 10 + 6 = 4; fourteen edges give 0, the same distance from 2
        let mut map = StructuralMap::new(8, 10, 6);
        let outcome = apply_candidate(&mut map, &SearchCandidate::new(Dimension::Edge, 14, 1.0));
        assert_eq!(
            outcome,
            CandidateOutcome::Accepted {
                changed: true,
                delta: 2
            }
        );
        assert_eq!(map.corruption_percentage, 2.0 / 28.0);
        let same = apply_candidate(&mut map, &SearchCandidate::new(Dimension::Edge, 14, 1.0));
        assert_eq!(
            same,
            CandidateOutcome::Accepted {
                changed: false,
                delta: 2
            }
        );
    }

    #[test]
    fn equal_delta_with_fewer_elements_is_rolled_back() {
        // two faces also give χ = 0, but 2 / 20 is worse than 2 / 24
        let mut map = StructuralMap::new(8, 10, 6);
        let before = map.clone();
        let outcome = apply_candidate(&mut map, &SearchCandidate::new(Dimension::Face, 2, 1.0));
        assert_eq!(
            outcome,
            CandidateOutcome::Rejected(RejectReason::RaisesCorruption)
        );
        assert_eq!(map, before);

        let pass = refine_structure(
            &mut map,
            &search(vec![SearchCandidate::new(Dimension::Face, 2, 1.0)], 10),
        );
        assert_eq!(pass.termination, SweepTermination::Stalled);
        assert_eq!(pass.history, vec![before.corruption_percentage]);
    }

    #[test]
    fn smaller_delta_that_raises_the_rate_is_rolled_back() {
        // 4 - 0 + 0 = 4 at rate 2/4; one vertex gives χ = 1 at rate 1/1
        let mut map = StructuralMap::new(4, 0, 0);
        let outcome = apply_candidate(&mut map, &SearchCandidate::new(Dimension::Vertex, 1, 1.0));
        assert_eq!(
            outcome,
            CandidateOutcome::Rejected(RejectReason::RaisesCorruption)
        );
        assert_eq!(map.num_vertices, 4);
    }

    #[test]
    fn no_improving_candidate_stalls_after_one_sweep() {
        // 8 - 12 + 4 = 0
        let mut map = StructuralMap::new(8, 12, 4);
        let candidates = vec![
            SearchCandidate::new(Dimension::Face, 2, 0.9),
            SearchCandidate::new(Dimension::Edge, 14, 0.8),
            SearchCandidate::new(Dimension::Vertex, 5, 0.7),
        ];
        let outcome = refine_structure(&mut map, &search(candidates, 50));
        assert_eq!(outcome.termination, SweepTermination::Stalled);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.accepted, 0);
        assert!(!outcome.converged());
        assert_eq!(map.euler_characteristic(), 0);
    }

    #[test]
    fn repair_converges_on_the_second_sweep() {
        let mut map = StructuralMap::new(8, 10, 6);
        let candidates = vec![
            SearchCandidate::new(Dimension::Edge, 12, 1.0),
            SearchCandidate::new(Dimension::Edge, 13, 0.5),
        ];
        let outcome = refine_structure(&mut map, &search(candidates, 10));
        assert!(outcome.converged());
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.accepted, 1);
        assert_eq!(outcome.history, vec![0.0, 0.0]);
        assert!(map.satisfies_invariant());
    }

    #[test]
    fn corruption_rate_decreases_step_by_step() {
        // 8 - 16 + 6 = -2, each edge candidate moves one step closer
        let mut map = StructuralMap::new(8, 16, 6);
        let mut rates = vec![map.corruption_percentage];
        for edges in [15, 14, 13, 12] {
            let candidate = SearchCandidate::new(Dimension::Edge, edges, 1.0);
            assert!(matches!(
                apply_candidate(&mut map, &candidate),
                CandidateOutcome::Accepted { changed: true, .. }
            ));
            rates.push(map.corruption_percentage);
        }
        for pair in rates.windows(2) {
            assert!(pair[1] <= pair[0], "{rates:?}");
        }
        assert_eq!(rates.last(), Some(&0.0));
    }

    #[test]
    fn iteration_cap_exhausts() {
        let mut map = StructuralMap::new(8, 10, 6);
        let candidates = vec![SearchCandidate::new(Dimension::Edge, 12, 1.0)];
        let outcome = refine_structure(&mut map, &search(candidates, 1));
        assert_eq!(outcome.termination, SweepTermination::Exhausted);
        assert_eq!(outcome.iterations, 1);
    }

    #[test]
    fn negative_threshold_is_rejected() {
        assert_eq!(
            IterativeSearch::new(10, -1.0, 0),
            Err(PolyrecError::InvalidThreshold(-1.0))
        );
    }

    struct RecordingProvider {
        requests: RefCell<Vec<(u64, Dimension)>>,
        emit: Option<Dimension>,
    }

    impl CandidateProvider for RecordingProvider {
        fn generate(&self, request: &CandidateRequest<'_>) -> Vec<SearchCandidate> {
            self.requests
                .borrow_mut()
                .push((request.nonce, request.dimension));
            self.emit
                .map(|dim| vec![SearchCandidate::new(dim, 6, 1.0)])
                .unwrap_or_default()
        }
    }

    #[test]
    fn multi_pass_cycles_dimensions_with_derived_nonces() {
        let mut map = StructuralMap::new(8, 10, 6);
        let provider = RecordingProvider {
            requests: RefCell::new(Vec::new()),
            emit: None,
        };
        let config = RefinementConfig {
            num_passes: 4,
            ..RefinementConfig::default()
        };
        assert!(!refine_structure_multi_pass(&mut map, None, &provider, &config));
        let requests = provider.requests.into_inner();
        assert_eq!(
            requests,
            vec![
                (0x9e37_79b9_7f4a_7c15, Dimension::Vertex),
                (0x9e37_79b9_7f4a_7c15_u64.wrapping_mul(2), Dimension::Edge),
                (0x9e37_79b9_7f4a_7c15_u64.wrapping_mul(3), Dimension::Face),
                (0x9e37_79b9_7f4a_7c15_u64.wrapping_mul(4), Dimension::Vertex),
            ]
        );
    }

    #[test]
    fn multi_pass_drops_mismatched_candidates() {
        let mut map = StructuralMap::new(8, 10, 6);
        let provider = RecordingProvider {
            requests: RefCell::new(Vec::new()),
            emit: Some(Dimension::Face),
        };
        let config = RefinementConfig {
            num_passes: 1,
            ..RefinementConfig::default()
        };
        // the only round asks for vertices, so the face candidate is ignored
        assert!(!refine_structure_multi_pass(&mut map, None, &provider, &config));
        assert_eq!(map.num_faces, 6);
    }

    #[test]
    fn multi_pass_repairs_with_seeded_provider() {
        let mut map = StructuralMap::new(8, 10, 6);
        let provider = crate::SeededCandidateProvider::default();
        let converged =
            refine_structure_multi_pass(&mut map, None, &provider, &RefinementConfig::default());
        assert!(converged);
        assert!(map.satisfies_invariant());
        assert!(is_structure_converged(&map, 0.01));
    }

    #[test]
    fn valid_structure_converges_without_candidates() {
        let mut map = StructuralMap::new(8, 12, 6);
        let provider = RecordingProvider {
            requests: RefCell::new(Vec::new()),
            emit: Some(Dimension::Vertex),
        };
        assert!(refine_structure_multi_pass(
            &mut map,
            None,
            &provider,
            &RefinementConfig::default()
        ));
        assert!(provider.requests.into_inner().is_empty());
        assert_eq!(map, StructuralMap::new(8, 12, 6));
    }

    #[test]
    fn structure_convergence_requires_invariant() {
        let mut map = StructuralMap::new(8, 10, 6);
        map.corruption_percentage = 0.0;
        assert!(!is_structure_converged(&map, 0.5));
        assert!(is_structure_converged(&StructuralMap::new(8, 12, 6), 0.5));
    }

    #[test]
    fn convergence_history_window() {
        let mut history = ConvergenceHistory::new(5);
        assert!(!history.is_converged(0.75, 0.01));
        for score in [0.7, 0.75, 0.8, 0.82, 0.83] {
            history.push(score);
        }
        assert!(history.is_converged(0.75, 0.01));
        assert!(!history.is_converged(0.9, 0.01));

        history.push(0.1);
        assert_eq!(history.len(), 5);
        assert_eq!(history.latest(), Some(0.1));
        assert!(!history.is_converged(0.75, 0.01));
    }

    #[test]
    fn zero_capacity_history_keeps_one_score() {
        let mut history = ConvergenceHistory::new(0);
        history.push(0.4);
        history.push(0.9);
        assert_eq!(history.len(), 1);
        assert_eq!(history.latest(), Some(0.9));
        assert_eq!(history.variance(), 0.0);
    }
}
