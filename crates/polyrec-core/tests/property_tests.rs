//! # Property-Based Tests
//!
//! Invariant and determinism checks using proptest.

use polyrec_core::{
    AnchorSystem, CandidateOutcome, CandidateProvider, CandidateRequest, Dimension,
    IterativeSearch, PlatonicSolid, SearchCandidate, SeededCandidateProvider, StructuralExpander,
    StructuralMap, Triangulator, apply_candidate, detect_corruption, refine_structure,
};
use proptest::collection::vec;
use proptest::prelude::*;

fn dimension() -> impl Strategy<Value = Dimension> {
    (0usize..3).prop_map(|i| Dimension::ALL[i])
}

fn solid() -> impl Strategy<Value = PlatonicSolid> {
    (0usize..5).prop_map(|i| PlatonicSolid::ALL[i])
}

fn candidate() -> impl Strategy<Value = SearchCandidate> {
    (dimension(), 0u64..2000).prop_map(|(d, v)| SearchCandidate::new(d, v, 1.0))
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// An accepted candidate never increases |V - E + F - 2|; a rejected one
    /// leaves the structure unchanged.
    #[test]
    fn candidate_never_worsens_invariant(
        v in 1u32..1000,
        e in 1u32..1000,
        f in 1u32..1000,
        c in candidate()
    ) {
        let mut map = StructuralMap::new(v, e, f);
        let before = map.clone();

        match apply_candidate(&mut map, &c) {
            CandidateOutcome::Accepted { delta, .. } => {
                prop_assert!(delta <= before.invariant_delta());
                prop_assert_eq!(delta, map.invariant_delta());
            }
            CandidateOutcome::Rejected(_) => {
                prop_assert_eq!(&map, &before);
            }
        }
    }

    /// A single pass never ends with a larger delta than it started with.
    #[test]
    fn refinement_pass_never_worsens_invariant(
        v in 1u32..200,
        e in 1u32..200,
        f in 1u32..200,
        candidates in vec(candidate(), 0..16),
        nonce in any::<u64>()
    ) {
        let mut map = StructuralMap::new(v, e, f);
        let start = map.invariant_delta();
        let search = IterativeSearch::new(10, 0.01, nonce)
            .expect("valid threshold")
            .with_candidates(candidates);

        let outcome = refine_structure(&mut map, &search);

        prop_assert!(map.invariant_delta() <= start);
        prop_assert_eq!(outcome.history.len(), outcome.iterations as usize);
        prop_assert!(outcome.iterations <= 10);
    }

    /// The corruption rate never rises from one sweep to the next, whether
    /// the pass converges, stalls, or runs out of iterations.
    #[test]
    fn refinement_pass_never_raises_corruption_rate(
        v in 1u32..200,
        e in 1u32..200,
        f in 1u32..200,
        candidates in vec(candidate(), 0..16),
        nonce in any::<u64>()
    ) {
        let mut map = StructuralMap::new(v, e, f);
        let mut rates = vec![map.corruption_percentage];
        let search = IterativeSearch::new(10, 0.01, nonce)
            .expect("valid threshold")
            .with_candidates(candidates);

        let outcome = refine_structure(&mut map, &search);
        rates.extend(&outcome.history);

        for pair in rates.windows(2) {
            prop_assert!(pair[1] <= pair[0], "rate rose: {:?}", rates);
        }
    }

    /// Archetype expansion always yields χ = 2 with a clean mask.
    #[test]
    fn archetype_expansion_keeps_invariant(
        v in 0u32..100,
        e in 0u32..100,
        f in 0u32..100,
        target in solid()
    ) {
        let source = StructuralMap::new(v, e, f);
        let expanded = StructuralExpander::default()
            .expand_to_platonic_solid(&source, target)
            .expect("default archetype");

        prop_assert_eq!(expanded.euler_characteristic(), 2);
        prop_assert!(expanded.corruption_mask.iter().all(|&flag| !flag));
        prop_assert!(expanded.corruption_percentage <= source.corruption_percentage);
    }

    /// Level expansion, when it succeeds, satisfies the invariant.
    #[test]
    fn level_expansion_keeps_invariant(
        v in 1u32..10_000,
        e in 1u32..10_000,
        f in 1u32..10_000,
        level in 0u32..8
    ) {
        let source = StructuralMap::new(v, e, f);
        let expander = StructuralExpander::default();
        if let Some(expanded) = expander.expand_model_by_level(&source, level) {
            prop_assert!(expanded.satisfies_invariant());
            prop_assert!(expanded.num_faces >= 1);
        }
    }

    /// Triangulation confidence stays in (0, 1].
    #[test]
    fn triangulation_confidence_is_bounded(
        anchors in vec(prop::array::uniform3(-100.0f64..100.0), 3..8),
        scale in 0.0f64..50.0
    ) {
        let system = AnchorSystem::from_positions(&anchors).expect("finite anchors");
        let expected: Vec<f64> = (0..system.len()).map(|i| scale + i as f64).collect();

        let recovery = Triangulator::default()
            .recover_vertex(&system, &expected)
            .expect("enough anchors");

        prop_assert!(recovery.confidence > 0.0);
        prop_assert!(recovery.confidence <= 1.0);
    }

    /// The scan rate is the flagged share of the input.
    #[test]
    fn scan_rate_matches_mask(values in vec(-1e4f64..1e4, 1..64), threshold in 1.0f64..1e4) {
        let scan = detect_corruption(&values, threshold).expect("valid input");

        prop_assert_eq!(scan.mask.len(), values.len());
        let flagged = scan.mask.iter().filter(|&&m| m).count();
        prop_assert_eq!(flagged, scan.corrupted);
        prop_assert!((scan.rate - flagged as f64 / values.len() as f64).abs() < 1e-12);
    }

    /// The seeded provider is a pure function of its request.
    #[test]
    fn seeded_provider_is_deterministic(
        nonce in any::<u64>(),
        v in 1u32..100,
        e in 1u32..100,
        f in 1u32..100,
        d in dimension()
    ) {
        let map = StructuralMap::new(v, e, f);
        let request = CandidateRequest {
            nonce,
            dimension: d,
            count: 8,
            structure: &map,
            oscillations: None,
        };
        let provider = SeededCandidateProvider::default();

        let first = provider.generate(&request);
        prop_assert_eq!(&first, &provider.generate(&request));
        prop_assert_eq!(first.len(), 8);
        prop_assert!(first.iter().all(|c| c.dimension == d && c.value >= 1));
        prop_assert!(first.windows(2).all(|w| w[0].score >= w[1].score));
    }
}
