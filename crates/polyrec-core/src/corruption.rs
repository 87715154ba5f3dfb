//! # Corruption Detection
//!
//! Two views of corruption:
//!
//! - [`detect_corruption`]: a per-element scan of raw values. An element is
//!   corrupted when it is NaN, infinite, or larger in magnitude than the
//!   threshold.
//! - [`assess_structure`]: a whole-structure classification from counts and
//!   vertex positions (missing data, Euler violation, positional outliers).

use crate::primitives::{OUTLIER_SIGMA, STRUCTURAL_SEVERITY};
use crate::types::{PolyrecError, PolyrecResult, Position, StructuralMap};
use serde::{Deserialize, Serialize};

// =============================================================================
// ELEMENT SCAN
// =============================================================================

/// Result of a raw-value corruption scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorruptionScan {
    /// One flag per input element.
    pub mask: Vec<bool>,
    pub corrupted: usize,
    /// `corrupted / len`.
    pub rate: f64,
}

impl CorruptionScan {
    /// Collapse the element mask into a per-vertex mask, `stride` elements
    /// per vertex. A vertex is corrupted if any of its elements is.
    pub fn vertex_mask(&self, stride: usize) -> PolyrecResult<Vec<bool>> {
        if stride == 0 {
            return Err(PolyrecError::InvalidParameter(
                "vertex stride must be at least 1".to_string(),
            ));
        }
        if self.mask.len() % stride != 0 {
            return Err(PolyrecError::DimensionMismatch {
                expected: self.mask.len().next_multiple_of(stride),
                actual: self.mask.len(),
            });
        }
        Ok(self
            .mask
            .chunks(stride)
            .map(|chunk| chunk.iter().any(|&flag| flag))
            .collect())
    }
}

/// Flag every element that is NaN, infinite, or has `|value| > threshold`.
pub fn detect_corruption(data: &[f64], threshold: f64) -> PolyrecResult<CorruptionScan> {
    if data.is_empty() {
        return Err(PolyrecError::EmptyInput("structure data"));
    }
    if !(threshold.is_finite() && threshold > 0.0) {
        return Err(PolyrecError::InvalidThreshold(threshold));
    }

    let mask: Vec<bool> = data
        .iter()
        .map(|&value| !value.is_finite() || value.abs() > threshold)
        .collect();
    let corrupted = mask.iter().filter(|&&flag| flag).count();
    let rate = corrupted as f64 / data.len() as f64;

    tracing::debug!(elements = data.len(), corrupted, rate, "corruption scan");

    Ok(CorruptionScan {
        mask,
        corrupted,
        rate,
    })
}

// =============================================================================
// STRUCTURE ASSESSMENT
// =============================================================================

/// Class of structural corruption, in decreasing order of precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptionKind {
    None,
    MissingData,
    Structural,
    Distortion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorruptionReport {
    pub kind: CorruptionKind,
    /// In `[0, 1]`.
    pub severity: f64,
    pub corrupted: u64,
    pub total: u64,
    pub description: String,
}

/// Classify a structure from its counts and vertex positions.
///
/// Precedence: missing data, then Euler violation, then positional outliers
/// (distance from the centroid more than 3σ away from the mean distance).
#[must_use]
pub fn assess_structure(map: &StructuralMap, positions: &[Position]) -> CorruptionReport {
    let total = map.total_elements();

    if map.num_vertices == 0 || map.num_edges == 0 || map.num_faces == 0 || positions.is_empty() {
        return CorruptionReport {
            kind: CorruptionKind::MissingData,
            severity: 1.0,
            corrupted: total,
            total,
            description: format!(
                "Missing geometric data (V={}, E={}, F={})",
                map.num_vertices, map.num_edges, map.num_faces
            ),
        };
    }

    if !map.satisfies_invariant() {
        let chi = map.euler_characteristic();
        return CorruptionReport {
            kind: CorruptionKind::Structural,
            severity: STRUCTURAL_SEVERITY,
            corrupted: map.invariant_delta(),
            total,
            description: format!("Euler invariant violated (V-E+F={chi}, expected 2)"),
        };
    }

    let outliers = count_outliers(positions);
    if outliers > 0 {
        let n = positions.len();
        return CorruptionReport {
            kind: CorruptionKind::Distortion,
            severity: outliers as f64 / n as f64,
            corrupted: outliers as u64,
            total: n as u64,
            description: format!("Vertex position outliers detected ({outliers}/{n} vertices)"),
        };
    }

    CorruptionReport {
        kind: CorruptionKind::None,
        severity: 0.0,
        corrupted: 0,
        total,
        description: "No corruption detected".to_string(),
    }
}

fn count_outliers(positions: &[Position]) -> usize {
    if positions.len() < 2 {
        return 0;
    }
    let n = positions.len() as f64;
    let mut centroid = [0.0; 3];
    for p in positions {
        for k in 0..3 {
            centroid[k] += p[k] / n;
        }
    }
    let distances: Vec<f64> = positions
        .iter()
        .map(|p| {
            let dx = p[0] - centroid[0];
            let dy = p[1] - centroid[1];
            let dz = p[2] - centroid[2];
            (dx * dx + dy * dy + dz * dz).sqrt()
        })
        .collect();
    let mean = distances.iter().sum::<f64>() / n;
    let variance = distances.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    distances
        .iter()
        .filter(|&&d| (d - mean).abs() > OUTLIER_SIGMA * std_dev)
        .count()
}
