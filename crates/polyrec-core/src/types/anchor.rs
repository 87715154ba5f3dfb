//! Trusted reference points for triangulation.

use super::{PolyrecError, PolyrecResult};
use serde::{Deserialize, Serialize};

/// A point in 3D space.
pub type Position = [f64; 3];

/// A vertex whose position is known and trusted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub vertex_id: u32,
    pub position: Position,
    /// Trust in `[0, 1]`.
    #[serde(default = "full_confidence")]
    pub confidence: f64,
}

const fn full_confidence() -> f64 {
    1.0
}

impl Anchor {
    #[must_use]
    pub const fn new(vertex_id: u32, position: Position) -> Self {
        Self {
            vertex_id,
            position,
            confidence: 1.0,
        }
    }

    #[must_use]
    pub const fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }
}

/// Ordered, read-only set of anchors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorSystem {
    anchors: Vec<Anchor>,
}

impl AnchorSystem {
    /// Build an anchor system. Every coordinate must be finite and every
    /// confidence within `[0, 1]`.
    pub fn new(anchors: Vec<Anchor>) -> PolyrecResult<Self> {
        for anchor in &anchors {
            if anchor.position.iter().any(|c| !c.is_finite()) {
                return Err(PolyrecError::InvalidParameter(format!(
                    "anchor {} has a non-finite coordinate",
                    anchor.vertex_id
                )));
            }
            if !(0.0..=1.0).contains(&anchor.confidence) {
                return Err(PolyrecError::InvalidParameter(format!(
                    "anchor {} confidence {} outside [0, 1]",
                    anchor.vertex_id, anchor.confidence
                )));
            }
        }
        Ok(Self { anchors })
    }

    /// Anchors numbered `0..n` in the order given.
    pub fn from_positions(positions: &[Position]) -> PolyrecResult<Self> {
        let anchors = positions
            .iter()
            .enumerate()
            .map(|(i, &p)| Anchor::new(i as u32, p))
            .collect();
        Self::new(anchors)
    }

    #[must_use]
    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        self.anchors.iter().map(|a| a.position)
    }

    /// Arithmetic mean of the anchor positions; the origin for an empty set.
    #[must_use]
    pub fn centroid(&self) -> Position {
        if self.anchors.is_empty() {
            return [0.0; 3];
        }
        let mut sum = [0.0; 3];
        for p in self.positions() {
            for k in 0..3 {
                sum[k] += p[k];
            }
        }
        let n = self.anchors.len() as f64;
        [sum[0] / n, sum[1] / n, sum[2] / n]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centroid_of_right_triangle() {
        let system =
            AnchorSystem::from_positions(&[[0.0, 0.0, 0.0], [9.0, 0.0, 0.0], [0.0, 9.0, 3.0]])
                .expect("valid anchors");
        assert_eq!(system.centroid(), [3.0, 3.0, 1.0]);
        assert_eq!(system.anchors()[2].vertex_id, 2);
    }

    #[test]
    fn rejects_non_finite_positions() {
        let err = AnchorSystem::from_positions(&[[f64::NAN, 0.0, 0.0]]).expect_err("NaN anchor");
        assert!(matches!(err, PolyrecError::InvalidParameter(_)));
    }

    #[test]
    fn rejects_confidence_out_of_range() {
        let anchor = Anchor::new(0, [0.0; 3]).with_confidence(1.5);
        assert!(AnchorSystem::new(vec![anchor]).is_err());
    }

    #[test]
    fn empty_system_centroid_is_origin() {
        let system = AnchorSystem::default();
        assert!(system.is_empty());
        assert_eq!(system.centroid(), [0.0; 3]);
    }
}
