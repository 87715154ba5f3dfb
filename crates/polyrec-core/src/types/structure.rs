//! # Structural Map
//!
//! The central mutable entity: element counts, the per-vertex corruption
//! mask, and opaque annotation payloads.

use super::{Dimension, PolyrecError, PolyrecResult};
use crate::primitives::EULER_TARGET;
use serde::{Deserialize, Serialize};

/// A polyhedral structure under recovery.
///
/// The Euler invariant `V - E + F = 2` is soft: a map may violate it while
/// it is being repaired. Refinement and expansion never increase
/// [`StructuralMap::invariant_delta`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralMap {
    pub num_vertices: u32,
    pub num_edges: u32,
    pub num_faces: u32,
    /// One flag per vertex; `true` means the position must be recovered.
    pub corruption_mask: Vec<bool>,
    /// `|V - E + F - 2| / (V + E + F)`, refreshed whenever counts change.
    pub corruption_percentage: f64,
    /// GCD matrix over dimension sizes, if attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coprime_matrix: Option<Vec<Vec<u64>>>,
    /// Per-dimension offsets, if attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensional_offsets: Option<Vec<f64>>,
}

impl StructuralMap {
    /// Create a map with a clean mask and a derived corruption percentage.
    #[must_use]
    pub fn new(num_vertices: u32, num_edges: u32, num_faces: u32) -> Self {
        let mut map = Self {
            num_vertices,
            num_edges,
            num_faces,
            corruption_mask: vec![false; num_vertices as usize],
            corruption_percentage: 0.0,
            coprime_matrix: None,
            dimensional_offsets: None,
        };
        map.recompute_corruption();
        map
    }

    /// Replace the corruption mask. It must hold exactly one flag per vertex.
    pub fn with_corruption_mask(mut self, mask: Vec<bool>) -> PolyrecResult<Self> {
        if mask.len() != self.num_vertices as usize {
            return Err(PolyrecError::DimensionMismatch {
                expected: self.num_vertices as usize,
                actual: mask.len(),
            });
        }
        self.corruption_mask = mask;
        Ok(self)
    }

    /// Attach the GCD matrix of the given dimension sizes.
    #[must_use]
    pub fn with_coprime_matrix(mut self, sizes: &[u64]) -> Self {
        self.coprime_matrix = Some(coprime_matrix(sizes));
        self
    }

    /// Attach per-dimension offsets.
    #[must_use]
    pub fn with_dimensional_offsets(mut self, offsets: Vec<f64>) -> Self {
        self.dimensional_offsets = Some(offsets);
        self
    }

    // =========================================================================
    // TOPOLOGY
    // =========================================================================

    /// `V - E + F`, exact for every `u32` triple.
    #[must_use]
    pub fn euler_characteristic(&self) -> i64 {
        i64::from(self.num_vertices) - i64::from(self.num_edges) + i64::from(self.num_faces)
    }

    /// `|V - E + F - 2|`.
    #[must_use]
    pub fn invariant_delta(&self) -> u64 {
        (self.euler_characteristic() - EULER_TARGET).unsigned_abs()
    }

    #[must_use]
    pub fn satisfies_invariant(&self) -> bool {
        self.invariant_delta() == 0
    }

    /// `V + E + F`.
    #[must_use]
    pub fn total_elements(&self) -> u64 {
        u64::from(self.num_vertices) + u64::from(self.num_edges) + u64::from(self.num_faces)
    }

    /// Refresh `corruption_percentage` from the current counts.
    pub fn recompute_corruption(&mut self) {
        self.corruption_percentage =
            corruption_ratio(self.invariant_delta(), self.total_elements());
    }

    // =========================================================================
    // COUNT ACCESS
    // =========================================================================

    #[must_use]
    pub fn count(&self, dimension: Dimension) -> u32 {
        match dimension {
            Dimension::Vertex => self.num_vertices,
            Dimension::Edge => self.num_edges,
            Dimension::Face => self.num_faces,
        }
    }

    /// Overwrite one count field. The mask and percentage are left untouched.
    pub fn set_count(&mut self, dimension: Dimension, value: u32) {
        match dimension {
            Dimension::Vertex => self.num_vertices = value,
            Dimension::Edge => self.num_edges = value,
            Dimension::Face => self.num_faces = value,
        }
    }

    /// Indices of vertices flagged for position recovery.
    pub fn corrupted_vertices(&self) -> impl Iterator<Item = usize> + '_ {
        self.corruption_mask
            .iter()
            .enumerate()
            .filter_map(|(i, &flag)| flag.then_some(i))
    }

    #[must_use]
    pub fn corrupted_vertex_count(&self) -> usize {
        self.corruption_mask.iter().filter(|&&flag| flag).count()
    }
}

/// `delta / total`; an empty structure is fully corrupted unless it is
/// trivially consistent.
pub(crate) fn corruption_ratio(delta: u64, total: u64) -> f64 {
    if total == 0 {
        return if delta == 0 { 0.0 } else { 1.0 };
    }
    delta as f64 / total as f64
}

/// GCD matrix over `sizes`: entry `[i][j] = gcd(sizes[i], sizes[j])`.
#[must_use]
pub fn coprime_matrix(sizes: &[u64]) -> Vec<Vec<u64>> {
    sizes
        .iter()
        .map(|&a| sizes.iter().map(|&b| gcd(a, b)).collect())
        .collect()
}

const fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}
