//! # Triangulation Recovery
//!
//! Recovers 3D vertex positions from distances to trusted anchors with a
//! Gauss–Newton solver.
//!
//! ## Solver
//!
//! 1. Start at the anchor centroid. A start lying in the plane of the first
//!    three anchors is lifted along the plane normal, since the Jacobian is
//!    singular there.
//! 2. Linearize `‖p - a_i‖ - d_i` over the first three anchors.
//! 3. Solve the 3×3 system with partial pivoting and step `p -= δ`.
//! 4. Blend each coordinate toward its nearest stability attractor.
//! 5. Stop once `‖δ‖` drops below the tolerance, the system is singular, or
//!    the iteration cap is reached.
//!
//! Confidence is `exp(-mean_i |‖p - a_i‖ - d_i|)` over all anchors.

use crate::config::TriangulationConfig;
use crate::primitives::{
    ADAPTIVE_THRESHOLD_DEFAULT, ADAPTIVE_THRESHOLD_MAX, ADAPTIVE_THRESHOLD_MIN,
    DISTANCE_SCALE_BASE, DISTANCE_SCALE_SPREAD, MIN_ANCHORS,
};
use crate::types::{AnchorSystem, PolyrecError, PolyrecResult, Position, StructuralMap};
use serde::{Deserialize, Serialize};

// =============================================================================
// RESULTS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveTermination {
    /// The update norm fell below the tolerance.
    Converged,
    /// A pivot fell below the singular threshold; the last position is kept.
    Singular,
    /// The iteration cap was reached.
    IterationCap,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VertexRecovery {
    pub position: Position,
    /// In `(0, 1]`.
    pub confidence: f64,
    pub iterations: u32,
    pub termination: SolveTermination,
}

// =============================================================================
// TRIANGULATOR
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct Triangulator {
    config: TriangulationConfig,
}

impl Triangulator {
    #[must_use]
    pub const fn new(config: TriangulationConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &TriangulationConfig {
        &self.config
    }

    /// Recover one position from one expected distance per anchor.
    pub fn recover_vertex(
        &self,
        anchors: &AnchorSystem,
        expected: &[f64],
    ) -> PolyrecResult<VertexRecovery> {
        check_anchors(anchors)?;
        if expected.len() != anchors.len() {
            return Err(PolyrecError::DistanceCountMismatch {
                anchors: anchors.len(),
                distances: expected.len(),
            });
        }
        if expected.iter().any(|d| !(d.is_finite() && *d >= 0.0)) {
            return Err(PolyrecError::InvalidParameter(
                "expected distances must be finite and non-negative".to_string(),
            ));
        }

        let basis = [
            anchors.anchors()[0].position,
            anchors.anchors()[1].position,
            anchors.anchors()[2].position,
        ];
        let mut position = self.starting_point(anchors, &basis);
        let mut termination = SolveTermination::IterationCap;
        let mut iterations = 0;

        while iterations < self.config.max_iterations {
            let (jacobian, residual) =
                linearize(&basis, expected, position, self.config.min_distance);
            let Some(delta) = solve_3x3(jacobian, residual, self.config.singular_pivot) else {
                tracing::warn!(iterations, ?position, "singular triangulation system");
                termination = SolveTermination::Singular;
                break;
            };

            for k in 0..3 {
                position[k] -= delta[k];
            }
            self.apply_stability_bias(&mut position);
            iterations += 1;

            if norm(delta) < self.config.tolerance {
                termination = SolveTermination::Converged;
                break;
            }
        }

        let confidence = compute_vertex_confidence(position, anchors, expected);
        tracing::debug!(iterations, ?termination, confidence, "vertex triangulated");

        Ok(VertexRecovery {
            position,
            confidence,
            iterations,
            termination,
        })
    }

    /// Recover every vertex flagged in `structure.corruption_mask`.
    ///
    /// Expected distances come from [`estimate_expected_distances`], which
    /// depends on the anchors alone. Every flagged vertex therefore receives
    /// the same solution; the estimate bounds the achievable accuracy.
    ///
    /// Returns the number of vertices written. Zero means nothing was
    /// recovered.
    pub fn recover_all_vertices(
        &self,
        anchors: &AnchorSystem,
        structure: &StructuralMap,
        positions: &mut [Position],
        confidences: &mut [f64],
    ) -> PolyrecResult<usize> {
        check_anchors(anchors)?;
        let mask = &structure.corruption_mask;
        for len in [positions.len(), confidences.len()] {
            if len != mask.len() {
                return Err(PolyrecError::DimensionMismatch {
                    expected: mask.len(),
                    actual: len,
                });
            }
        }
        if structure.corrupted_vertex_count() == 0 {
            return Ok(0);
        }

        let expected = estimate_expected_distances(anchors);
        let recovery = self.recover_vertex(anchors, &expected)?;

        let mut recovered = 0;
        for vertex in structure.corrupted_vertices() {
            positions[vertex] = recovery.position;
            confidences[vertex] = recovery.confidence;
            recovered += 1;
        }
        tracing::info!(recovered, confidence = recovery.confidence, "vertices recovered");
        Ok(recovered)
    }

    fn starting_point(&self, anchors: &AnchorSystem, basis: &[Position; 3]) -> Position {
        let mut start = anchors.centroid();
        if self.config.coplanar_lift <= 0.0 {
            return start;
        }
        let normal = cross(sub(basis[1], basis[0]), sub(basis[2], basis[0]));
        let length = norm(normal);
        if length < self.config.min_distance {
            // collinear basis, no plane to leave
            return start;
        }
        let unit = [normal[0] / length, normal[1] / length, normal[2] / length];
        if dot(sub(start, basis[0]), unit).abs() < self.config.min_distance {
            for k in 0..3 {
                start[k] += self.config.coplanar_lift * unit[k];
            }
        }
        start
    }

    fn apply_stability_bias(&self, position: &mut Position) {
        let weight = self.config.attractor_weight;
        if self.config.attractors.is_empty() || weight == 0.0 {
            return;
        }
        for coordinate in position.iter_mut() {
            if let Some(attractor) = nearest_attractor(*coordinate, &self.config.attractors) {
                *coordinate = (1.0 - weight) * *coordinate + weight * attractor;
            }
        }
    }
}

fn check_anchors(anchors: &AnchorSystem) -> PolyrecResult<()> {
    if anchors.len() < MIN_ANCHORS {
        return Err(PolyrecError::InsufficientAnchors {
            required: MIN_ANCHORS,
            actual: anchors.len(),
        });
    }
    Ok(())
}

// =============================================================================
// ESTIMATES
// =============================================================================

/// Heuristic distance from an unknown vertex to each anchor:
/// `‖a_i - centroid‖ · (0.9 + 0.2·i/n)`.
///
/// A first-order proxy that places the vertex roughly at centroid distance.
#[must_use]
pub fn estimate_expected_distances(anchors: &AnchorSystem) -> Vec<f64> {
    let centroid = anchors.centroid();
    let n = anchors.len() as f64;
    anchors
        .positions()
        .enumerate()
        .map(|(i, p)| {
            norm(sub(p, centroid)) * (DISTANCE_SCALE_BASE + DISTANCE_SCALE_SPREAD * i as f64 / n)
        })
        .collect()
}

/// `exp(-mean |‖p - a_i‖ - d_i|)`, floored to the smallest positive `f64`.
#[must_use]
pub fn compute_vertex_confidence(
    position: Position,
    anchors: &AnchorSystem,
    expected: &[f64],
) -> f64 {
    if anchors.is_empty() {
        return f64::MIN_POSITIVE;
    }
    let total: f64 = anchors
        .positions()
        .zip(expected)
        .map(|(a, d)| (norm(sub(position, a)) - d).abs())
        .sum();
    let confidence = (-total / anchors.len() as f64).exp();
    if confidence.is_nan() {
        return f64::MIN_POSITIVE;
    }
    confidence.max(f64::MIN_POSITIVE)
}

/// Attractor closest to `value`; the first on ties.
fn nearest_attractor(value: f64, attractors: &[f64]) -> Option<f64> {
    attractors
        .iter()
        .copied()
        .reduce(|best, a| if (value - a).abs() < (value - best).abs() { a } else { best })
}

// =============================================================================
// LINEAR ALGEBRA
// =============================================================================

fn linearize(
    basis: &[Position; 3],
    expected: &[f64],
    position: Position,
    min_distance: f64,
) -> ([[f64; 3]; 3], [f64; 3]) {
    let mut jacobian = [[0.0; 3]; 3];
    let mut residual = [0.0; 3];
    for (i, anchor) in basis.iter().enumerate() {
        let diff = sub(position, *anchor);
        let dist = norm(diff).max(min_distance);
        jacobian[i] = [diff[0] / dist, diff[1] / dist, diff[2] / dist];
        residual[i] = dist - expected[i];
    }
    (jacobian, residual)
}

/// Gaussian elimination with partial pivoting. `None` when a pivot is below
/// `singular_pivot`.
fn solve_3x3(mut a: [[f64; 3]; 3], mut b: [f64; 3], singular_pivot: f64) -> Option<[f64; 3]> {
    for col in 0..3 {
        let pivot_row = (col..3).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        let pivot = a[pivot_row][col].abs();
        if pivot.is_nan() || pivot < singular_pivot {
            return None;
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);
        for row in col + 1..3 {
            let factor = a[row][col] / a[col][col];
            for k in col..3 {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0; 3];
    for row in (0..3).rev() {
        let tail: f64 = (row + 1..3).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

fn sub(a: Position, b: Position) -> Position {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: Position, b: Position) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: Position, b: Position) -> Position {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn norm(v: Position) -> f64 {
    dot(v, v).sqrt()
}

// =============================================================================
// METRICS
// =============================================================================

/// Confidence summary over a set of vertices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriangulationMetrics {
    pub avg_confidence: f64,
    pub min_confidence: f64,
    pub max_confidence: f64,
}

impl TriangulationMetrics {
    /// `None` for an empty slice.
    #[must_use]
    pub fn from_confidences(confidences: &[f64]) -> Option<Self> {
        if confidences.is_empty() {
            return None;
        }
        let sum: f64 = confidences.iter().sum();
        Some(Self {
            avg_confidence: sum / confidences.len() as f64,
            min_confidence: confidences.iter().copied().fold(f64::INFINITY, f64::min),
            max_confidence: confidences.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        })
    }
}

/// Recovery outcome over a whole structure.
///
/// A corrupted vertex counts as recovered when its confidence exceeds an
/// adaptive threshold: the upper median of the corrupted confidences,
/// clamped to `[0.3, 0.8]`, or 0.6 when nothing is corrupted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecoveryMetrics {
    pub total_vertices: usize,
    pub corrupted_vertices: usize,
    pub recovered_vertices: usize,
    pub threshold: f64,
    pub recovery_rate: f64,
    pub avg_confidence: f64,
    pub min_confidence: f64,
    pub max_confidence: f64,
    pub avg_corrupted_confidence: f64,
    /// `corrupted / total`.
    pub corruption_fraction: f64,
}

impl RecoveryMetrics {
    pub fn compute(confidences: &[f64], mask: &[bool]) -> PolyrecResult<Self> {
        if confidences.len() != mask.len() {
            return Err(PolyrecError::DimensionMismatch {
                expected: mask.len(),
                actual: confidences.len(),
            });
        }
        let Some(summary) = TriangulationMetrics::from_confidences(confidences) else {
            return Err(PolyrecError::EmptyInput("confidence scores"));
        };

        let corrupted: Vec<f64> = confidences
            .iter()
            .zip(mask)
            .filter_map(|(&c, &flag)| flag.then_some(c))
            .collect();
        let threshold = adaptive_threshold(&corrupted);
        let recovered = corrupted.iter().filter(|&&c| c > threshold).count();

        let (recovery_rate, avg_corrupted_confidence) = if corrupted.is_empty() {
            (1.0, 1.0)
        } else {
            let n = corrupted.len() as f64;
            (recovered as f64 / n, corrupted.iter().sum::<f64>() / n)
        };

        Ok(Self {
            total_vertices: confidences.len(),
            corrupted_vertices: corrupted.len(),
            recovered_vertices: recovered,
            threshold,
            recovery_rate,
            avg_confidence: summary.avg_confidence,
            min_confidence: summary.min_confidence,
            max_confidence: summary.max_confidence,
            avg_corrupted_confidence,
            corruption_fraction: corrupted.len() as f64 / confidences.len() as f64,
        })
    }

    /// Recovery rate and average confidence both meet their minimums.
    #[must_use]
    pub fn validate_recovery_quality(
        &self,
        min_recovery_rate: f64,
        min_avg_confidence: f64,
    ) -> bool {
        self.recovery_rate >= min_recovery_rate && self.avg_confidence >= min_avg_confidence
    }
}

fn adaptive_threshold(corrupted: &[f64]) -> f64 {
    if corrupted.is_empty() {
        return ADAPTIVE_THRESHOLD_DEFAULT;
    }
    let mut sorted = corrupted.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted[sorted.len() / 2].clamp(ADAPTIVE_THRESHOLD_MIN, ADAPTIVE_THRESHOLD_MAX)
}
