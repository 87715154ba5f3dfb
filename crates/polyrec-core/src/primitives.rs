//! # Innate Primitives
//!
//! Fixed numeric constants of the recovery engine.
//!
//! Tunable values (thresholds, caps, attractor sets, rule tables) live in
//! [`crate::config`] and take these constants as their defaults. The values
//! here that are not surfaced in configuration are properties of the
//! algorithms themselves.

// =============================================================================
// TOPOLOGY
// =============================================================================

/// Euler characteristic of a genus-0 convex polyhedron: `V - E + F = 2`.
pub const EULER_TARGET: i64 = 2;

// =============================================================================
// NUMERICAL FLOORS
// =============================================================================

/// Pivot magnitude below which a 3×3 system is treated as singular.
pub const SINGULAR_PIVOT: f64 = 1e-10;

/// Floor applied to point-to-anchor distances before dividing by them.
pub const MIN_DISTANCE: f64 = 1e-10;

// =============================================================================
// TRIANGULATION
// =============================================================================

/// Minimum anchor count for 3D triangulation.
pub const MIN_ANCHORS: usize = 3;

/// Gauss–Newton iteration cap.
pub const GAUSS_NEWTON_MAX_ITERATIONS: u32 = 100;

/// Gauss–Newton stops once the update vector norm drops below this.
pub const GAUSS_NEWTON_TOLERANCE: f64 = 1e-6;

/// Default stability attractors.
///
/// Small power towers (`2^2`, `2^2^2`, ...), `3^3`, `3^3^3` and `5^5`.
pub const DEFAULT_ATTRACTORS: [f64; 7] = [
    4.0,
    16.0,
    256.0,
    65536.0,
    27.0,
    7_625_597_484_987.0,
    3125.0,
];

/// Weight of the attractor in the per-iteration stability blend.
pub const DEFAULT_ATTRACTOR_WEIGHT: f64 = 0.1;

/// Offset along the anchor-plane normal applied to a coplanar starting point.
pub const DEFAULT_COPLANAR_LIFT: f64 = 1.0;

/// Base scale of the heuristic expected-distance estimate.
pub const DISTANCE_SCALE_BASE: f64 = 0.9;

/// Per-anchor spread of the heuristic expected-distance estimate.
pub const DISTANCE_SCALE_SPREAD: f64 = 0.2;

/// Adaptive recovery threshold bounds and fallback.
pub const ADAPTIVE_THRESHOLD_MIN: f64 = 0.3;
pub const ADAPTIVE_THRESHOLD_MAX: f64 = 0.8;
pub const ADAPTIVE_THRESHOLD_DEFAULT: f64 = 0.6;

// =============================================================================
// OSCILLATION ANALYSIS
// =============================================================================

/// A magnitude series with coefficient of variation below this is stable.
pub const STABILITY_COV_THRESHOLD: f64 = 0.10;

/// Spectral magnitudes below this are treated as exact zeros.
pub const SPECTRAL_FLOOR: f64 = 1e-9;

/// Frequency scale (Hz) of the cross-correlation decay `exp(-|Δf| / scale)`.
pub const CORRELATION_FREQUENCY_SCALE: f64 = 10.0;

// =============================================================================
// REFINEMENT
// =============================================================================

/// Multiplier deriving the nonce of multi-pass round `p` as `K * (p + 1)`.
pub const PASS_NONCE_MULTIPLIER: u64 = 0x9e37_79b9_7f4a_7c15;

/// Inner iteration cap of each multi-pass round.
pub const MULTI_PASS_INNER_ITERATIONS: u32 = 10;

/// Default half-width of the seeded candidate offset window.
pub const DEFAULT_CANDIDATE_SPREAD: u32 = 3;

// =============================================================================
// EXPANSION
// =============================================================================

/// Fraction of corruption retained by a Platonic expansion (20% reduction).
pub const PLATONIC_CORRUPTION_RETENTION: f64 = 0.8;

/// Fraction of corruption retained by a level expansion (10% reduction).
pub const LEVEL_CORRUPTION_RETENTION: f64 = 0.9;

/// Count growth per expansion level: counts scale by `1 + 0.5 * level`.
pub const LEVEL_GROWTH_PER_STEP: f64 = 0.5;

/// Corruption scale between consecutive self-similar hierarchy levels.
pub const SELF_SIMILAR_SCALE: f64 = 0.618;

/// Most levels a self-similar hierarchy may hold.
pub const MAX_HIERARCHY_LEVELS: usize = 64;

/// Expansion quality score weights.
pub const QUALITY_WEIGHT_INVARIANT: f64 = 0.5;
pub const QUALITY_WEIGHT_CORRUPTION: f64 = 0.3;
pub const QUALITY_WEIGHT_GROWTH: f64 = 0.2;

// =============================================================================
// CORRUPTION ASSESSMENT
// =============================================================================

/// Vertex distance deviations beyond this many standard deviations are outliers.
pub const OUTLIER_SIGMA: f64 = 3.0;

/// Severity reported for a structure whose counts violate the invariant.
pub const STRUCTURAL_SEVERITY: f64 = 0.8;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_weights_sum_to_one() {
        let sum = QUALITY_WEIGHT_INVARIANT + QUALITY_WEIGHT_CORRUPTION + QUALITY_WEIGHT_GROWTH;
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn pass_nonce_multiplier_is_golden_ratio_constant() {
        assert_eq!(PASS_NONCE_MULTIPLIER, 0x9e3779b97f4a7c15);
    }

    #[test]
    fn adaptive_bounds_are_ordered() {
        assert!(ADAPTIVE_THRESHOLD_MIN < ADAPTIVE_THRESHOLD_DEFAULT);
        assert!(ADAPTIVE_THRESHOLD_DEFAULT < ADAPTIVE_THRESHOLD_MAX);
    }
}
