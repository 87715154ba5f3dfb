//! # Core Type Definitions
//!
//! This module contains the core types of the recovery engine:
//! - Structural dimensions and candidate values (`Dimension`, `SearchCandidate`)
//! - The central mutable entity (`StructuralMap`)
//! - Trusted reference points (`Anchor`, `AnchorSystem`, `Position`)
//! - Error types (`PolyrecError`)
//!
//! ## Integer Topology
//!
//! Element counts are `u32`. Every Euler characteristic is computed in `i64`,
//! so `V - E + F` never overflows for any representable structure.

mod anchor;
mod structure;

pub use anchor::{Anchor, AnchorSystem, Position};
pub use structure::{StructuralMap, coprime_matrix};
pub(crate) use structure::corruption_ratio;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// DIMENSION
// =============================================================================

/// One of the three structural count fields of a polyhedron.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Vertex,
    Edge,
    Face,
}

impl Dimension {
    /// All dimensions in tag order.
    pub const ALL: [Self; 3] = [Self::Vertex, Self::Edge, Self::Face];

    /// Numeric tag: vertex 0, edge 1, face 2.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Vertex => 0,
            Self::Edge => 1,
            Self::Face => 2,
        }
    }

    /// Decode a numeric tag. Out-of-range tags yield `None`.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Vertex),
            1 => Some(Self::Edge),
            2 => Some(Self::Face),
            _ => None,
        }
    }

    /// Sign of this count in `V - E + F`.
    #[must_use]
    pub const fn euler_sign(self) -> i64 {
        match self {
            Self::Edge => -1,
            Self::Vertex | Self::Face => 1,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Vertex => "vertex",
            Self::Edge => "edge",
            Self::Face => "face",
        };
        f.write_str(name)
    }
}

// =============================================================================
// SEARCH CANDIDATE
// =============================================================================

/// A proposed replacement value for one count field.
///
/// The value is carried as `u64` so that providers can propose values that
/// do not fit a count; those are rejected at application time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub dimension: Dimension,
    pub value: u64,
    pub score: f64,
}

impl SearchCandidate {
    #[must_use]
    pub const fn new(dimension: Dimension, value: u64, score: f64) -> Self {
        Self {
            dimension,
            value,
            score,
        }
    }

    /// Build a candidate from a raw dimension tag.
    ///
    /// Returns `None` for a tag outside `0..3`.
    #[must_use]
    pub const fn from_tag(tag: usize, value: u64, score: f64) -> Option<Self> {
        match Dimension::from_index(tag) {
            Some(dimension) => Some(Self::new(dimension, value, score)),
            None => None,
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the recovery engine.
///
/// - Malformed inputs fail fast with a typed variant
/// - Numerical degeneracy (singular systems) is NOT an error; solvers stop
///   early and report the best result so far
/// - The core never panics
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PolyrecError {
    /// An input collection that must be non-empty was empty.
    #[error("Empty input: {0}")]
    EmptyInput(&'static str),

    /// A threshold that must be a positive finite number was not.
    #[error("Invalid threshold: {0} (must be positive and finite)")]
    InvalidThreshold(f64),

    /// A series length is not a power of two and padding is disabled.
    #[error("Series length {0} is not a power of two")]
    NonPowerOfTwo(usize),

    /// Two related inputs disagree on their length.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Triangulation was given fewer anchors than it needs.
    #[error("Insufficient anchors: need at least {required}, got {actual}")]
    InsufficientAnchors { required: usize, actual: usize },

    /// The expected-distance array does not have one entry per anchor.
    #[error("Distance count mismatch: {anchors} anchors, {distances} distances")]
    DistanceCountMismatch { anchors: usize, distances: usize },

    /// A derived element count does not fit `u32`.
    #[error("Count overflow: {0}")]
    CountOverflow(String),

    /// A numeric argument is outside its domain.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A configuration value is outside its domain.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result alias used throughout the core.
pub type PolyrecResult<T> = Result<T, PolyrecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_tags_round_trip() {
        for dim in Dimension::ALL {
            assert_eq!(Dimension::from_index(dim.index()), Some(dim));
        }
        assert_eq!(Dimension::from_index(3), None);
    }

    #[test]
    fn euler_signs() {
        assert_eq!(Dimension::Vertex.euler_sign(), 1);
        assert_eq!(Dimension::Edge.euler_sign(), -1);
        assert_eq!(Dimension::Face.euler_sign(), 1);
    }

    #[test]
    fn candidate_from_invalid_tag_is_rejected() {
        assert!(SearchCandidate::from_tag(7, 4, 1.0).is_none());
        let candidate = SearchCandidate::from_tag(1, 6, 0.5).expect("edge tag");
        assert_eq!(candidate.dimension, Dimension::Edge);
    }

    #[test]
    fn error_messages_name_the_problem() {
        let err = PolyrecError::InsufficientAnchors {
            required: 3,
            actual: 2,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient anchors: need at least 3, got 2"
        );
    }

    #[test]
    fn dimension_display_names() {
        assert_eq!(Dimension::Vertex.to_string(), "vertex");
        assert_eq!(Dimension::Face.to_string(), "face");
    }
}
